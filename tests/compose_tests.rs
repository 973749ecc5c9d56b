//! End-to-end tests for envelope composition.
//!
//! The PDF is re-loaded with lopdf and its content streams inspected, so the
//! tests check what a printer would actually receive.

use lopdf::Document;
use lopdf::content::Content;
use shukin_envelopes::helpers::layout::plan_sheets;
use shukin_envelopes::models::layout::{LANDSCAPE, PORTRAIT};
use shukin_envelopes::{EnvelopeError, MemberRecord, RosterConfiguration, Typeface, compose};

fn scenario_roster() -> Vec<MemberRecord> {
    vec![
        MemberRecord::new("Yamada Taro", Some(3000)),
        MemberRecord::new("Suzuki Jiro", Some(3000)),
        MemberRecord::new("Sato Hanako", Some(3500)),
    ]
}

fn config() -> RosterConfiguration {
    RosterConfiguration::new(2025, 3000, vec!["Uniform fee".into(), "Camp fee".into()]).unwrap()
}

fn fallback() -> Typeface {
    Typeface::fallback("no Japanese typeface in tests")
}

/// Operators and text operands of every page, in page order.
fn pages(bytes: &[u8]) -> Vec<(Vec<String>, Vec<Vec<u8>>)> {
    let doc = Document::load_mem(bytes).unwrap();
    doc.get_pages()
        .values()
        .map(|page_id| {
            let content = Content::decode(&doc.get_page_content(*page_id).unwrap()).unwrap();
            let operators = content
                .operations
                .iter()
                .map(|op| op.operator.clone())
                .collect();
            let texts = content
                .operations
                .iter()
                .filter(|op| op.operator == "Tj")
                .map(|op| op.operands[0].as_str().unwrap().to_vec())
                .collect();
            (operators, texts)
        })
        .collect()
}

fn count(operators: &[String], name: &str) -> usize {
    operators.iter().filter(|op| op.as_str() == name).count()
}

// ==================== Scenarios ====================

mod scenarios {
    use super::*;

    #[test]
    fn landscape_puts_three_members_on_one_page() {
        let roster = scenario_roster();
        let bytes = compose(&roster, &config(), &LANDSCAPE, &fallback()).unwrap();

        let pages = pages(&bytes);
        assert_eq!(pages.len(), 1);

        let names: Vec<&[u8]> = pages[0]
            .1
            .iter()
            .filter(|text| text.ends_with(b" ?"))
            .map(|text| text.as_slice())
            .collect();
        assert_eq!(
            names,
            vec![
                b"Yamada Taro ?".as_slice(),
                b"Suzuki Jiro ?".as_slice(),
                b"Sato Hanako ?".as_slice(),
            ]
        );

        // 団費 has no WinAnsi glyphs, the yen sign does
        assert!(pages[0].1.iter().any(|text| text == b"??: \xa53,500"));
    }

    #[test]
    fn landscape_plan_reads_yen_3500_for_sato() {
        let plan = plan_sheets(&scenario_roster(), &config(), &LANDSCAPE).unwrap();
        let sato = &plan.pages[0].cards[2];
        assert_eq!(sato.name_line, "Sato Hanako 殿");
        assert!(sato.fee_line.as_deref().unwrap().contains("¥3,500"));
    }

    #[test]
    fn portrait_splits_three_members_over_two_pages() {
        let roster = scenario_roster();
        let bytes = compose(&roster, &config(), &PORTRAIT, &fallback()).unwrap();

        let pages = pages(&bytes);
        assert_eq!(pages.len(), 2);

        let plan = plan_sheets(&roster, &config(), &PORTRAIT).unwrap();
        assert_eq!(plan.pages[0].cards.len(), 2);
        assert_eq!(plan.pages[1].cards.len(), 1);
        let sato = &plan.pages[1].cards[0];
        assert_eq!(sato.slot, 0);
        assert_eq!(sato.record_index, 2);
        assert_eq!(sato.origin, PORTRAIT.slot_origins[0]);
    }

    #[test]
    fn empty_roster_produces_no_document() {
        let result = compose(&[], &config(), &LANDSCAPE, &fallback());
        assert!(matches!(result, Err(EnvelopeError::EmptyRoster)));
    }

    #[test]
    fn two_extra_labels_still_draw_six_rows() {
        let roster = vec![MemberRecord::new("Yamada Taro", None)];
        let bytes = compose(&roster, &config(), &LANDSCAPE, &fallback()).unwrap();
        let (operators, texts) = pages(&bytes).remove(0);

        // border + 3 header cells + 12 x 3 month cells + 6 x 2 extra cells
        assert_eq!(count(&operators, "re"), 1 + 3 + 36 + 12);
        assert!(texts.iter().any(|text| text == b"Uniform fee"));
        assert!(texts.iter().any(|text| text == b"Camp fee"));
    }
}

// ==================== Structural properties ====================

mod properties {
    use super::*;

    #[test]
    fn page_count_is_ceiling_of_roster_over_slots() {
        for n in 1usize..=8 {
            let roster: Vec<MemberRecord> = (0..n)
                .map(|i| MemberRecord::new(format!("Member {}", i), None))
                .collect();

            let landscape = compose(&roster, &config(), &LANDSCAPE, &fallback()).unwrap();
            assert_eq!(pages(&landscape).len(), n.div_ceil(3), "landscape, n = {}", n);

            let portrait = compose(&roster, &config(), &PORTRAIT, &fallback()).unwrap();
            assert_eq!(pages(&portrait).len(), n.div_ceil(2), "portrait, n = {}", n);
        }
    }

    #[test]
    fn every_card_is_drawn() {
        let roster: Vec<MemberRecord> = (0..5)
            .map(|i| MemberRecord::new(format!("Member {}", i), None))
            .collect();
        let bytes = compose(&roster, &config(), &LANDSCAPE, &fallback()).unwrap();

        let borders: usize = pages(&bytes)
            .iter()
            .map(|(operators, _)| count(operators, "re"))
            .sum();
        assert_eq!(borders, 5 * 52);
    }

    #[test]
    fn landscape_text_per_card() {
        let bytes = compose(&scenario_roster(), &config(), &LANDSCAPE, &fallback()).unwrap();
        let (_, texts) = pages(&bytes).remove(0);
        // title, name, fee, 3 headings, 12 months, caption, 2 extra labels
        assert_eq!(texts.len(), 3 * 21);
    }

    #[test]
    fn portrait_prefills_the_fee_in_grey() {
        let roster = vec![MemberRecord::new("Sato Hanako", Some(3500))];
        let bytes = compose(&roster, &config(), &PORTRAIT, &fallback()).unwrap();
        let (operators, texts) = pages(&bytes).remove(0);

        // no fee line, but one hint per month
        assert_eq!(texts.len(), 20 + 12);
        assert_eq!(texts.iter().filter(|text| *text == b"3,500").count(), 12);
        assert_eq!(count(&operators, "g"), 24);
    }

    #[test]
    fn months_are_in_fiscal_order() {
        let bytes = compose(&scenario_roster()[..1], &config(), &LANDSCAPE, &fallback()).unwrap();
        let (_, texts) = pages(&bytes).remove(0);

        let months: Vec<Vec<u8>> = texts
            .into_iter()
            .filter(|text| text.len() <= 3 && text[0].is_ascii_digit())
            .collect();
        let expected: Vec<Vec<u8>> = [4, 5, 6, 7, 8, 9, 10, 11, 12, 1, 2, 3]
            .iter()
            .map(|m| format!("{}?", m).into_bytes())
            .collect();
        assert_eq!(months, expected);
    }

    #[test]
    fn default_fee_fills_missing_fees() {
        let roster = vec![MemberRecord::new("Suzuki Jiro", None)];
        let bytes = compose(&roster, &config(), &LANDSCAPE, &fallback()).unwrap();
        let (_, texts) = pages(&bytes).remove(0);
        assert!(texts.iter().any(|text| text == b"??: \xa53,000"));
    }

    #[test]
    fn compose_is_deterministic() {
        let first = compose(&scenario_roster(), &config(), &PORTRAIT, &fallback()).unwrap();
        let second = compose(&scenario_roster(), &config(), &PORTRAIT, &fallback()).unwrap();
        assert_eq!(first, second);
    }
}
