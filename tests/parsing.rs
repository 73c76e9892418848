//! Parsing Integration Tests
//!
//! Raw model responses through the extractor and into label sets.

use rl_eval::core::extractor::{extract_output, Extracted};
use rl_eval::core::parser::{
    canonicalize_label_list, interpret_prediction, parse_category_list, parse_comma_digits, parse_compact,
};
use rl_eval::domain::{Category, LabelSet, Language, ParseFailure, Prediction};

fn set(ids: &[u32]) -> LabelSet {
    ids.iter().filter_map(|&id| Category::new(id)).collect()
}

#[test]
fn test_fenced_output_block_parses_to_labels() {
    let response = "Step 1: the speaker names the village...\nStep 3: decide.\n**Output:**\n```\nRL1, RL4\n```";

    let extracted = extract_output(response, Language::En);
    assert_eq!(extracted, Extracted::Labels("RL1, RL4".to_string()));

    let labels = parse_category_list(Some(extracted.as_cell()), Language::En);
    assert_eq!(labels, set(&[1, 4]));
}

#[test]
fn test_chinese_response_round_trip() {
    let response = "第一步：……\n第二步：……\n**输出：**\n认同逻辑3，认同逻辑6";

    let cell = extract_output(response, Language::Zh).into_cell();
    match interpret_prediction(Some(cell.as_str()), Language::Zh) {
        Prediction::Labels(labels) => assert_eq!(labels, set(&[3, 6])),
        other => panic!("expected labels, got {:?}", other),
    }
}

#[test]
fn test_missing_marker_is_a_parse_failure_not_empty() {
    let cell = extract_output("This comment is mostly about food prices.", Language::En).into_cell();
    assert_eq!(cell, "PARSE_ERROR_NO_MARKER");

    let prediction = interpret_prediction(Some(cell.as_str()), Language::En);
    assert_eq!(prediction, Prediction::ParseFailure(ParseFailure::NoMarker));
    assert!(prediction.is_failure());
    assert!(prediction.labels().is_empty());
}

#[test]
fn test_empty_marker_is_a_legitimate_empty_prediction() {
    let cell = extract_output("Reasoning...\n**Output:** None", Language::En).into_cell();
    let prediction = interpret_prediction(Some(cell.as_str()), Language::En);
    assert_eq!(prediction, Prediction::Empty);
    assert!(!prediction.is_failure());
}

#[test]
fn test_call_error_sentinel() {
    let prediction = interpret_prediction(Some("ERROR"), Language::Zh);
    assert!(prediction.is_call_failure());
}

#[test]
fn test_bad_tokens_do_not_discard_good_ones() {
    let labels = parse_category_list(Some("RL2, something else, RLx, RL5"), Language::En);
    assert_eq!(labels, set(&[2, 5]));
}

#[test]
fn test_compact_round_trip() {
    for ids in [&[][..], &[1][..], &[1, 4, 7][..], &[2, 3, 5, 6][..], &[1, 2, 3, 4, 5, 6, 7][..]] {
        let labels = set(ids);
        assert_eq!(parse_compact(Some(labels.to_compact().as_str())).unwrap(), labels);
    }
}

#[test]
fn test_compact_sentinels() {
    assert!(parse_compact(None).unwrap().is_empty());
    assert!(parse_compact(Some("-")).unwrap().is_empty());
    assert_eq!(parse_compact(Some("4.0")).unwrap(), set(&[4]));
    assert!(parse_compact(Some("18")).is_err());
}

#[test]
fn test_comma_digits() {
    assert_eq!(parse_comma_digits(Some("1, 4,7")).unwrap(), set(&[1, 4, 7]));
    assert!(parse_comma_digits(Some("1,a")).is_err());
}

#[test]
fn test_canonicalize_label_list() {
    assert_eq!(
        canonicalize_label_list("RL4 and RL1, RL4 again", Language::En),
        "RL4, RL1"
    );
    assert_eq!(canonicalize_label_list("-", Language::Zh), "-");
    assert_eq!(canonicalize_label_list("no labels", Language::Zh), "");
}
