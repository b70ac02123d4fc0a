use std::sync::Arc;

use crate::error::EngineError;
use crate::node::{Fragment, Node};
use crate::resolve::NodeRange;
use crate::schema::{Attrs, NodeType, Schema};
use crate::selection::Selection;
use crate::transform::step::{Mapping, Step};
use crate::transform::structure::{can_join, can_split};

/// An accumulating edit against one document version: an ordered list of
/// steps, the mapping they induce, and the selection carried alongside. Apply
/// it to its originating state to commit; until then nothing is shared.
#[derive(Debug, Clone)]
pub struct Transaction {
    schema: Arc<Schema>,
    doc: Node,
    steps: Vec<Step>,
    docs: Vec<Node>,
    mapping: Mapping,
    selection: Selection,
    selection_set: bool,
}

impl Transaction {
    pub(crate) fn new(schema: Arc<Schema>, doc: Node, selection: Selection) -> Self {
        Self {
            schema,
            doc,
            steps: Vec::new(),
            docs: Vec::new(),
            mapping: Mapping::new(),
            selection,
            selection_set: false,
        }
    }

    /// The document as it stands after the steps added so far.
    pub fn doc(&self) -> &Node {
        &self.doc
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn step_count(&self) -> usize {
        self.steps.len()
    }

    pub fn mapping(&self) -> &Mapping {
        &self.mapping
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    /// Pin the selection for the resulting state. A pinned selection is no
    /// longer remapped by later steps; its positions are validated only when
    /// the transaction commits.
    pub fn set_selection(&mut self, selection: Selection) -> &mut Self {
        self.selection = selection;
        self.selection_set = true;
        self
    }

    /// Apply one step, recording the document it applied to and threading the
    /// carried selection through the step's position map.
    pub fn step(&mut self, step: Step) -> Result<&mut Self, EngineError> {
        let map = step.map(&self.doc)?;
        let next = step.apply(&self.doc)?;
        let prev = std::mem::replace(&mut self.doc, next);
        self.docs.push(prev);
        self.steps.push(step);
        if !self.selection_set {
            self.selection = self.selection.map(&self.doc, &map);
        }
        self.mapping.push(map);
        Ok(self)
    }

    /// Replace `[from, to)` with the given nodes. Both ends must share a
    /// parent and the result must satisfy that parent's content rule.
    pub fn replace_with(
        &mut self,
        from: usize,
        to: usize,
        content: Vec<Node>,
    ) -> Result<&mut Self, EngineError> {
        self.step(Step::Replace {
            from,
            to,
            slice: Fragment::from_vec(content),
        })
    }

    /// Delete `[from, to)`.
    pub fn delete(&mut self, from: usize, to: usize) -> Result<&mut Self, EngineError> {
        self.step(Step::Replace {
            from,
            to,
            slice: Fragment::empty(),
        })
    }

    /// Retype every textblock intersecting `[from, to)` to `kind`, skipping
    /// blocks whose content the target type rejects and blocks already
    /// carrying the requested markup. Skips are silent.
    pub fn set_block_type(
        &mut self,
        from: usize,
        to: usize,
        kind: &Arc<NodeType>,
        attrs: Attrs,
    ) -> &mut Self {
        let base = self.doc.clone();
        let maps_before = self.mapping.len();
        let mut targets = Vec::new();
        base.nodes_between(from, to, &mut |node, pos| {
            if node.is_textblock()
                && kind.valid_content(node.content())
                && !(node.kind().name == kind.name && *node.attrs() == attrs)
            {
                targets.push(pos);
            }
            !node.is_leaf()
        });
        for pos in targets {
            let mapped = self.mapping.map_from(maps_before, pos, 1);
            let _ = self.step(Step::SetNodeMarkup {
                pos: mapped,
                kind: Arc::clone(kind),
                attrs: attrs.clone(),
            });
        }
        self
    }

    /// Change the type and attributes of the single node starting at `pos`.
    pub fn set_node_markup(
        &mut self,
        pos: usize,
        kind: &Arc<NodeType>,
        attrs: Attrs,
    ) -> Result<&mut Self, EngineError> {
        self.step(Step::SetNodeMarkup {
            pos,
            kind: Arc::clone(kind),
            attrs,
        })
    }

    /// Lift the blocks in `range` to the given ancestor depth.
    pub fn lift(&mut self, range: &NodeRange, target: usize) -> Result<&mut Self, EngineError> {
        if target >= range.depth {
            return Err(EngineError::InvalidLiftTarget {
                target,
                depth: range.depth,
            });
        }
        self.step(Step::Lift {
            from: range.from.pos,
            to: range.to.pos,
            depth: range.depth,
            target,
        })
    }

    /// Split the node around `pos` into two siblings.
    pub fn split(&mut self, pos: usize) -> Result<&mut Self, EngineError> {
        if !can_split(&self.doc, pos) {
            return Err(EngineError::CannotSplit(pos));
        }
        self.step(Step::Split {
            pos,
            kind_after: None,
        })
    }

    /// Join the two nodes meeting at `pos`.
    pub fn join(&mut self, pos: usize) -> Result<&mut Self, EngineError> {
        if !can_join(&self.doc, pos) {
            return Err(EngineError::CannotJoin(pos));
        }
        self.step(Step::Join { pos })
    }

    /// The steps undoing this transaction, in application order against the
    /// resulting document.
    pub fn inverted_steps(&self) -> Result<Vec<Step>, EngineError> {
        let mut out = Vec::with_capacity(self.steps.len());
        for (step, doc) in self.steps.iter().zip(&self.docs).rev() {
            out.push(step.invert(doc)?);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{CODE_BLOCK, DOC, HEADING, IMAGE, PARAGRAPH};
    use crate::state::EditorState;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn para(schema: &Schema, text: &str) -> Node {
        let children = if text.is_empty() {
            vec![]
        } else {
            vec![schema.text(text)]
        };
        schema.node(PARAGRAPH, Attrs::new(), children).unwrap()
    }

    fn state_with(schema: &Arc<Schema>, children: Vec<Node>) -> EditorState {
        let doc = schema.node(DOC, Attrs::new(), children).unwrap();
        EditorState::with_doc(Arc::clone(schema), doc).unwrap()
    }

    #[test]
    fn steps_accumulate_and_positions_compose() {
        let schema = Schema::notebook();
        let state = state_with(&schema, vec![para(&schema, "ab"), para(&schema, "cd")]);
        let mut tr = state.tr();
        tr.delete(1, 3).unwrap();
        tr.delete(3, 5).unwrap();
        assert_eq!(tr.step_count(), 2);
        assert_eq!(tr.doc().child(0).text_content(), "");
        assert_eq!(tr.doc().child(1).text_content(), "");
        // A position after both deletions shifts by their combined size.
        assert_eq!(tr.mapping().map(8, 1), 4);
    }

    #[test]
    fn carried_selection_follows_edits_until_pinned() {
        let schema = Schema::notebook();
        let state = state_with(&schema, vec![para(&schema, "ab"), para(&schema, "cd")]);
        let mut tr = state.tr();
        tr.set_selection(Selection::cursor(7));
        let pinned = *tr.selection();
        tr.delete(1, 3).unwrap();
        // A pinned selection is left alone.
        assert_eq!(*tr.selection(), pinned);

        let mut tr = state.tr();
        // The state's own cursor sits at the document start and survives a
        // later deletion untouched; a cursor behind the deletion moves.
        tr.delete(5, 7).unwrap();
        assert_eq!(tr.selection().from(), 1);
    }

    #[test]
    fn set_block_type_retypes_only_compatible_blocks() {
        let schema = Schema::notebook();
        let code = schema
            .node(CODE_BLOCK, Attrs::new(), vec![schema.text("x = 1")])
            .unwrap();
        let image = schema.node(IMAGE, Attrs::new(), vec![]).unwrap();
        let with_image = schema
            .node(PARAGRAPH, Attrs::new(), vec![schema.text("a"), image])
            .unwrap();
        let state = state_with(&schema, vec![para(&schema, "plain"), with_image, code]);
        let heading = Arc::clone(state.schema.get(HEADING).unwrap());
        let mut tr = state.tr();
        let size = tr.doc().content_size();
        let mut attrs = Attrs::new();
        attrs.insert("level".into(), json!(2));
        tr.set_block_type(0, size, &heading, attrs);

        // Headings take any inline content, so every textblock converts.
        assert_eq!(tr.doc().child(0).kind().name, HEADING);
        assert_eq!(tr.doc().child(1).kind().name, HEADING);
        assert_eq!(tr.doc().child(2).kind().name, HEADING);
        assert_eq!(tr.doc().child(0).attrs().get("level"), Some(&json!(2)));
    }

    #[test]
    fn set_block_type_skips_blocks_already_at_the_target_markup() {
        let schema = Schema::notebook();
        let state = state_with(&schema, vec![para(&schema, "ab")]);
        let paragraph = Arc::clone(state.schema.get(PARAGRAPH).unwrap());
        let mut tr = state.tr();
        tr.set_block_type(0, 4, &paragraph, Attrs::new());
        assert_eq!(tr.step_count(), 0);
    }

    #[test]
    fn inverted_steps_restore_the_original_document() {
        let schema = Schema::notebook();
        let state = state_with(&schema, vec![para(&schema, "ab"), para(&schema, "cd")]);
        let mut tr = state.tr();
        tr.delete(1, 3).unwrap();
        tr.join(2).unwrap();
        let mut doc = tr.doc().clone();
        for step in tr.inverted_steps().unwrap() {
            doc = step.apply(&doc).unwrap();
        }
        assert_eq!(doc, state.doc);
    }

    #[test]
    fn split_and_join_guard_their_preconditions() {
        let schema = Schema::notebook();
        let state = state_with(&schema, vec![para(&schema, "ab")]);
        let mut tr = state.tr();
        assert!(matches!(tr.split(0), Err(EngineError::CannotSplit(0))));
        assert!(matches!(tr.join(1), Err(EngineError::CannotJoin(1))));
        tr.split(2).unwrap();
        assert_eq!(tr.doc().child_count(), 2);
        tr.join(3).unwrap();
        assert_eq!(tr.doc().child_count(), 1);
        assert_eq!(tr.doc().child(0).text_content(), "ab");
    }
}
