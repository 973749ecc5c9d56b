//! Composition with an embedded TrueType typeface.
//!
//! `tests/fixtures/envelope-test.ttf` is a 2048-unit glyph-box font covering
//! ASCII, ¥ and the Japanese label text. Glyph ids: space is 1, `!`..`~` are
//! 2..=95, ¥ is 96 and 年度集金袋殿団費月額受領印臨時など■ follow from 97.

use lopdf::content::Content;
use lopdf::{Dictionary, Document, Object, Stream};
use shukin_envelopes::helpers::font::EmbeddedFont;
use shukin_envelopes::models::layout::LANDSCAPE;
use shukin_envelopes::{MemberRecord, RosterConfiguration, Typeface, compose};

const TEST_TTF: &[u8] = include_bytes!("fixtures/envelope-test.ttf");

const GID_NEN: i64 = 97; // 年
const GID_DONO: i64 = 102; // 殿

fn typeface() -> Typeface {
    Typeface::Embedded(EmbeddedFont::from_bytes(TEST_TTF.to_vec()).unwrap())
}

fn composed() -> Document {
    let roster = vec![MemberRecord::new("Yamada Taro", Some(3000))];
    let config = RosterConfiguration::new(2025, 3000, vec!["臨時集金1".into()]).unwrap();
    let bytes = compose(&roster, &config, &LANDSCAPE, &typeface()).unwrap();
    Document::load_mem(&bytes).unwrap()
}

fn ascii_gid(ch: char) -> u16 {
    u16::from(ch as u8 - b'!') + 2
}

fn referenced<'a>(doc: &'a Document, dict: &Dictionary, key: &[u8]) -> &'a Object {
    let id = dict.get(key).unwrap().as_reference().unwrap();
    doc.get_object(id).unwrap()
}

fn stream_content(stream: &Stream) -> Vec<u8> {
    if stream.dict.has(b"Filter") {
        stream.decompressed_content().unwrap()
    } else {
        stream.content.clone()
    }
}

fn type0_font(doc: &Document) -> &Dictionary {
    doc.objects
        .values()
        .filter_map(|object| object.as_dict().ok())
        .find(|dict| {
            dict.get(b"Subtype").and_then(Object::as_name).ok() == Some(b"Type0".as_slice())
        })
        .expect("no Type0 font in the document")
}

fn cid_font<'a>(doc: &'a Document, type0: &Dictionary) -> &'a Dictionary {
    let descendants = type0.get(b"DescendantFonts").unwrap().as_array().unwrap();
    assert_eq!(descendants.len(), 1);
    let id = descendants[0].as_reference().unwrap();
    doc.get_dictionary(id).unwrap()
}

/// `W` as `(gid, width)` pairs, written as `gid [width]`.
fn widths(cid_font: &Dictionary) -> Vec<(i64, i64)> {
    cid_font
        .get(b"W")
        .unwrap()
        .as_array()
        .unwrap()
        .chunks(2)
        .map(|pair| {
            let gid = pair[0].as_i64().unwrap();
            let width = pair[1].as_array().unwrap()[0].as_i64().unwrap();
            (gid, width)
        })
        .collect()
}

#[test]
fn type0_font_descends_to_embedded_truetype() {
    let doc = composed();

    let type0 = type0_font(&doc);
    assert_eq!(type0.get(b"Encoding").unwrap().as_name().unwrap(), b"Identity-H");
    assert_eq!(type0.get(b"BaseFont").unwrap().as_name().unwrap(), b"EnvelopeTest");

    let cid_font = cid_font(&doc, type0);
    assert_eq!(cid_font.get(b"Subtype").unwrap().as_name().unwrap(), b"CIDFontType2");
    assert_eq!(cid_font.get(b"CIDToGIDMap").unwrap().as_name().unwrap(), b"Identity");

    let descriptor = referenced(&doc, cid_font, b"FontDescriptor").as_dict().unwrap();
    assert_eq!(descriptor.get(b"Ascent").unwrap().as_i64().unwrap(), 879);

    let font_file = referenced(&doc, descriptor, b"FontFile2").as_stream().unwrap();
    assert_eq!(
        font_file.dict.get(b"Length1").unwrap().as_i64().unwrap(),
        TEST_TTF.len() as i64
    );
    assert_eq!(stream_content(font_file), TEST_TTF);
}

#[test]
fn widths_cover_exactly_the_glyphs_drawn() {
    let doc = composed();
    let widths = widths(cid_font(&doc, type0_font(&doc)));

    // ideographs are a full em, ASCII glyphs 1139/2048
    assert!(widths.contains(&(GID_NEN, 1000)));
    assert!(widths.contains(&(GID_DONO, 1000)));
    assert!(widths.contains(&(i64::from(ascii_gid('Y')), 556)));
    assert!(widths.contains(&(1, 277)));

    // every glyph has a glyph in the fixture, so .notdef never appears
    assert!(widths.iter().all(|(gid, _)| *gid != 0));
    // 'Q' is not in any label text
    assert!(!widths.iter().any(|(gid, _)| *gid == i64::from(ascii_gid('Q'))));

    let gids: Vec<i64> = widths.iter().map(|(gid, _)| *gid).collect();
    let mut sorted = gids.clone();
    sorted.sort_unstable();
    sorted.dedup();
    assert_eq!(gids, sorted);
}

#[test]
fn to_unicode_maps_glyphs_back_to_text() {
    let doc = composed();
    let type0 = type0_font(&doc);

    let stream = referenced(&doc, type0, b"ToUnicode").as_stream().unwrap();
    let cmap = String::from_utf8(stream_content(stream)).unwrap();

    assert!(cmap.contains("beginbfchar"));
    assert!(cmap.contains("<0061> <5E74>\n")); // 年
    assert!(cmap.contains("<0066> <6BBF>\n")); // 殿
    assert!(cmap.contains(&format!("<{:04X}> <0059>\n", ascii_gid('Y'))));
    assert!(cmap.contains("<0060> <00A5>\n")); // ¥
}

#[test]
fn text_is_shown_as_two_byte_glyph_ids() {
    let doc = composed();
    let page_id = *doc.get_pages().values().next().unwrap();
    let content = Content::decode(&doc.get_page_content(page_id).unwrap()).unwrap();

    let texts: Vec<&[u8]> = content
        .operations
        .iter()
        .filter(|op| op.operator == "Tj")
        .map(|op| op.operands[0].as_str().unwrap())
        .collect();

    let title: Vec<u8> = ['2', '0', '2', '5']
        .into_iter()
        .map(ascii_gid)
        .chain([GID_NEN as u16, 98, 1, 99, 100, 101])
        .flat_map(u16::to_be_bytes)
        .collect();
    assert_eq!(texts[0], title.as_slice());

    let name: Vec<u8> = "Yamada Taro"
        .chars()
        .map(|ch| if ch == ' ' { 1 } else { ascii_gid(ch) })
        .chain([1, GID_DONO as u16])
        .flat_map(u16::to_be_bytes)
        .collect();
    assert_eq!(texts[1], name.as_slice());

    assert!(texts.iter().all(|text| text.len() % 2 == 0));
}
