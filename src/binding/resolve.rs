//! Node resolution for selector keys

use smallvec::{smallvec, SmallVec};

use super::key::{NodeTarget, SelectorKey};
use crate::dom::Node;

/// Matched node set; most keys hit a handful of nodes
pub type Matches = SmallVec<[Node; 4]>;

/// Nodes a key addresses below `context`, in document order
///
/// Self keys yield exactly `[context]`. Descendant queries never include
/// `context` itself and may yield nothing, which callers skip silently.
pub fn resolve(context: &Node, key: &SelectorKey) -> Matches {
    match key.target() {
        NodeTarget::SelfNode => smallvec![context.clone()],
        NodeTarget::Descendants(selector) => {
            context.query_selector_all(selector).into_iter().collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(raw: &str) -> SelectorKey {
        SelectorKey::parse(raw).unwrap()
    }

    #[test]
    fn self_key_yields_context() {
        let root = Node::parse("<div><span></span></div>").unwrap();
        let found = resolve(&root, &key("@class"));
        assert_eq!(found.len(), 1);
        assert!(found[0].ptr_eq(&root));
    }

    #[test]
    fn descendants_in_document_order() {
        let root = Node::parse("<ul><li>a</li><li><ul><li>b</li></ul></li></ul>").unwrap();
        let texts: Vec<String> = resolve(&root, &key("li"))
            .iter()
            .map(Node::text_content)
            .collect();
        assert_eq!(texts, vec!["a", "b", "b"]);
    }

    #[test]
    fn context_is_never_matched() {
        let root = Node::parse("<div><div>inner</div></div>").unwrap();
        let found = resolve(&root, &key("div"));
        assert_eq!(found.len(), 1);
        assert!(!found[0].ptr_eq(&root));
    }

    #[test]
    fn miss_is_empty() {
        let root = Node::parse("<div></div>").unwrap();
        assert!(resolve(&root, &key("table")).is_empty());
    }
}
