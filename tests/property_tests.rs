//! Property tests for key parsing, markup round trips and binding invariants

use proptest::prelude::*;
use treebind::{Binder, BoundValue, Mapping, Node, SelectorKey, TargetKind};

fn list_template() -> Node {
    let body = Node::element("body");
    for node in Node::parse_fragment("<div class='list'>Items: <i>NAME</i><b>end</b></div>") {
        body.append_child(&node).unwrap();
    }
    body.element_children().into_iter().next().unwrap()
}

fn items_mapping(items: &[String]) -> BoundValue {
    Mapping::new()
        .with("i", items.to_vec())
        .unwrap()
        .into()
}

proptest! {
    #[test]
    fn key_parsing_never_panics(raw in any::<String>()) {
        let _ = SelectorKey::parse(&raw);
    }

    #[test]
    fn attribute_keys_split_on_last_at(tag in "[a-z]{1,8}", name in "[a-z][a-z0-9-]{0,10}") {
        let key = SelectorKey::parse(&format!("{tag}@{name}")).unwrap();
        prop_assert_eq!(key.kind(), TargetKind::Attribute);
        prop_assert_eq!(key.usable_name(), Some(name.as_str()));
        prop_assert!(!key.is_self());
    }

    #[test]
    fn attribute_values_survive_serialization(value in "[ -~]{0,24}") {
        let node = Node::element("div");
        node.set_attribute("title", value.clone());
        let reparsed = Node::parse(&node.outer_html()).unwrap();
        prop_assert_eq!(reparsed.attribute("title"), Some(value));
    }

    #[test]
    fn sequence_length_drives_clone_count(items in prop::collection::vec("[a-zA-Z0-9 ]{0,12}", 0..20)) {
        let root = list_template();
        Binder::new().bind_value(&root, &items_mapping(&items)).unwrap();
        prop_assert_eq!(root.select("i").unwrap().len(), items.len());
        prop_assert_eq!(root.select("b").unwrap().len(), 1);
    }

    #[test]
    fn binding_is_idempotent(
        first in prop::collection::vec("[a-z]{1,6}", 0..8),
        second in prop::collection::vec("[a-z]{1,6}", 0..8),
    ) {
        let binder = Binder::new();
        let root = list_template();

        binder.bind_value(&root, &items_mapping(&second)).unwrap();
        let direct = root.outer_html();

        binder.bind_value(&root, &items_mapping(&first)).unwrap();
        binder.bind_value(&root, &items_mapping(&second)).unwrap();

        prop_assert_eq!(root.outer_html(), direct);
    }
}
