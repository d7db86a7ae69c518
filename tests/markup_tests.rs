use proptest::prelude::*;
use recap::utils::markup::{contains_markup, escape, repair, smart_escape, strip};

#[test]
fn test_escape_then_strip_restores_the_text() {
    let raw = "Use snake_case and *stars* in [brackets]";
    assert_eq!(strip(&escape(raw)), raw);
}

#[test]
fn test_repair_leaves_valid_markup_alone() {
    let text = "*Overview*\n• _first_ point with `code`\n[link](https://example.com)";
    assert_eq!(repair(text), text);
}

#[test]
fn test_repair_fixes_model_style_output() {
    let text = "**Summary**\n* item one\n* item two with odd_underscore";
    assert_eq!(
        repair(text),
        "*Summary*\n• item one\n• item two with odd\\_underscore"
    );
}

#[test]
fn test_smart_escape_keeps_multiple_titles() {
    let text = "*Topics*\nrelease_v2 [draft]\n\n*Notes*\nnone";
    assert_eq!(
        smart_escape(text),
        "*Topics*\nrelease\\_v2 \\[draft\\]\n\n*Notes*\nnone"
    );
}

#[test]
fn test_smart_escape_does_not_pair_across_lines() {
    assert_eq!(smart_escape("*open\nclose*"), "\\*open\nclose\\*");
}

#[test]
fn test_strip_handles_empty_link_label() {
    assert_eq!(strip("see [](https://a.io/x_y)"), "see https://a.io/x_y");
}

proptest! {
    #[test]
    fn prop_strip_of_escaped_restores_plain_input(s in "[^\\\\]{0,80}") {
        prop_assert_eq!(strip(&escape(&s)), s.clone());
    }

    #[test]
    fn prop_repair_keeps_escaped_text(s in "\\PC{0,80}") {
        let escaped = escape(&s);
        prop_assert_eq!(repair(&escaped), escaped.clone());
        prop_assert!(!contains_markup(&escaped));
    }

    #[test]
    fn prop_escape_is_idempotent(s in "\\PC{0,80}") {
        let once = escape(&s);
        prop_assert_eq!(escape(&once), once.clone());
    }

    #[test]
    fn prop_sanitizers_never_panic(s in "[\\*_`\\[\\]\\\\()a-z \\n]{0,60}") {
        let _ = repair(&s);
        let _ = smart_escape(&s);
        let _ = strip(&s);
    }
}
