//! The title-block invariant: exactly one title block, canonical, always first.

use std::collections::HashSet;

use tracing::debug;

use plone_mcp_shared::{BlockSet, TITLE_BLOCK_TYPE, block_type_of};

use crate::normalize::title_block;

/// Make `layout` list each block id exactly once.
///
/// Ids without a block are dropped, repeated ids keep their first position, and
/// blocks missing from the layout are appended in mapping order.
pub fn reconcile_layout(set: &mut BlockSet) {
    let mut seen = HashSet::with_capacity(set.layout.len());
    let blocks = &set.blocks;
    set.layout
        .retain(|id| blocks.contains_key(id) && seen.insert(id.clone()));

    let missing: Vec<String> = set
        .blocks
        .keys()
        .filter(|id| !seen.contains(*id))
        .cloned()
        .collect();
    if !missing.is_empty() {
        debug!(count = missing.len(), "appending blocks missing from layout");
        set.layout.extend(missing);
    }
}

/// Enforce the title invariant on `set`, minting an id with `new_id` if a title
/// block has to be created.
///
/// The first title block in layout order survives with canonical data; any other
/// title blocks are deleted. Applying this twice changes nothing the second time.
pub fn enforce_title(set: &mut BlockSet, mut new_id: impl FnMut() -> String) {
    reconcile_layout(set);

    let title_ids: Vec<String> = set
        .layout
        .iter()
        .filter(|id| {
            set.blocks
                .get(id.as_str())
                .and_then(block_type_of)
                .is_some_and(|t| t == TITLE_BLOCK_TYPE)
        })
        .cloned()
        .collect();

    let keep = match title_ids.split_first() {
        Some((first, extra)) => {
            for id in extra {
                set.blocks.shift_remove(id);
            }
            if !extra.is_empty() {
                debug!(removed = extra.len(), "dropped duplicate title blocks");
                set.layout.retain(|id| !extra.contains(id));
            }
            first.clone()
        }
        None => {
            let mut id = new_id();
            while set.blocks.contains_key(&id) {
                id = new_id();
            }
            debug!(%id, "inserting missing title block");
            id
        }
    };

    set.blocks.insert(keep.clone(), title_block());
    set.layout.retain(|id| *id != keep);
    set.layout.insert(0, keep);
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};

    fn set(blocks: Value, layout: &[&str]) -> BlockSet {
        BlockSet::new(
            blocks.as_object().cloned().unwrap(),
            layout.iter().map(|s| s.to_string()).collect(),
        )
    }

    fn counter() -> impl FnMut() -> String {
        let mut n = 0;
        move || {
            n += 1;
            format!("new{n}")
        }
    }

    #[test]
    fn empty_set_gets_title() {
        let mut s = BlockSet::default();
        enforce_title(&mut s, counter());
        assert_eq!(s.layout, vec!["new1"]);
        assert_eq!(s.blocks["new1"], json!({ "@type": "title" }));
    }

    #[test]
    fn title_moved_to_front() {
        let mut s = set(
            json!({ "a": { "@type": "slate" }, "t": { "@type": "title" } }),
            &["a", "t"],
        );
        enforce_title(&mut s, counter());
        assert_eq!(s.layout, vec!["t", "a"]);
    }

    #[test]
    fn first_title_in_layout_order_survives() {
        let mut s = set(
            json!({
                "a": { "@type": "slate" },
                "b": { "@type": "title", "extra": true },
                "title": { "@type": "title" }
            }),
            &["a", "b", "title"],
        );
        enforce_title(&mut s, counter());
        assert_eq!(s.layout, vec!["b", "a"]);
        assert_eq!(s.blocks["b"], json!({ "@type": "title" }));
        assert!(!s.blocks.contains_key("title"));
    }

    #[test]
    fn fresh_id_avoids_existing_keys() {
        let mut s = set(json!({ "new1": { "@type": "slate" } }), &["new1"]);
        enforce_title(&mut s, counter());
        assert_eq!(s.layout, vec!["new2", "new1"]);
    }

    #[test]
    fn layout_is_reconciled() {
        let mut s = set(
            json!({
                "t": { "@type": "title" },
                "a": { "@type": "slate" },
                "b": { "@type": "image" }
            }),
            &["a", "ghost", "a", "t"],
        );
        enforce_title(&mut s, counter());
        assert_eq!(s.layout, vec!["t", "a", "b"]);
    }

    #[test]
    fn enforcement_is_idempotent() {
        let mut s = set(
            json!({
                "x": { "@type": "slate" },
                "y": { "@type": "title" },
                "z": { "@type": "title" }
            }),
            &["z", "x"],
        );
        enforce_title(&mut s, counter());
        let once = s.clone();
        enforce_title(&mut s, || panic!("no id needed"));
        assert_eq!(s, once);
        assert_eq!(s.layout, vec!["z", "x"]);
    }
}
