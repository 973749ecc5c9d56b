use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, Object, ObjectId, Stream, StringFormat, dictionary};
use std::collections::BTreeMap;
use tracing::info;
use ttf_parser::Face;

use crate::error::EnvelopeError;
use crate::helpers::font::{EmbeddedFont, Typeface, helvetica_width, win_ansi_byte};
use crate::helpers::layout::{
    CardPlan, EXTRA_CAPTION, MONTH_HEADER, SheetPlan, month_text, plan_sheets,
};
use crate::models::layout::LayoutGeometry;
use crate::models::roster::{MemberRecord, RosterConfiguration};

pub const PDF_MIME: &str = "application/pdf";

const FONT_KEY: &str = "F1";

/// Download name offered for the finished sheet.
pub fn suggested_filename(fiscal_year: i32) -> String {
    format!("shukin_bukuro_{}.pdf", fiscal_year)
}

/// Lays out one label per member and renders the sheet to PDF bytes.
pub fn compose(
    roster: &[MemberRecord],
    config: &RosterConfiguration,
    geometry: &LayoutGeometry,
    typeface: &Typeface,
) -> Result<Vec<u8>, EnvelopeError> {
    info!(
        "Composing envelopes for {} member(s), fiscal year {}",
        roster.len(),
        config.fiscal_year
    );
    let plan = plan_sheets(roster, config, geometry)?;
    render_sheet(&plan, geometry, typeface)
}

pub fn render_sheet(
    plan: &SheetPlan,
    geometry: &LayoutGeometry,
    typeface: &Typeface,
) -> Result<Vec<u8>, EnvelopeError> {
    let mut canvas = PdfCanvas::new(plan.page_width, plan.page_height, typeface)?;

    for (index, page) in plan.pages.iter().enumerate() {
        if index > 0 {
            canvas.show_page()?;
        }
        for card in &page.cards {
            draw_card(&mut canvas, card, geometry);
        }
    }

    let output = canvas.finish()?;
    info!(
        "Rendered {} page(s), size: {} bytes",
        plan.pages.len(),
        output.len()
    );
    Ok(output)
}

fn draw_card(canvas: &mut PdfCanvas<'_>, card: &CardPlan, g: &LayoutGeometry) {
    let x = card.origin.x;
    let top = card.origin.y + g.label_height;
    let centre = x + g.label_width / 2.0;

    canvas.set_line_width(1.0);
    canvas.set_stroke_gray(0.0);
    canvas.rect(x, card.origin.y, g.label_width, g.label_height);

    canvas.draw_centred_string(centre, top - g.title_offset, g.title_font_size, &card.title);
    canvas.draw_centred_string(centre, top - g.name_offset, g.name_font_size, &card.name_line);
    if let (Some(line), Some(offset)) = (&card.fee_line, g.fee_line_offset) {
        canvas.draw_centred_string(centre, top - offset, g.fee_font_size, line);
    }

    let columns = [
        (card.table_x, g.month_column_width),
        (card.table_x + g.month_column_width, g.amount_column_width),
        (
            card.table_x + g.month_column_width + g.amount_column_width,
            g.stamp_column_width,
        ),
    ];

    for ((col_x, col_w), heading) in columns.iter().zip(MONTH_HEADER) {
        canvas.rect(*col_x, card.month_header_y, *col_w, g.row_height);
        canvas.draw_centred_string(
            col_x + col_w / 2.0,
            card.month_header_y + g.cell_text_inset,
            g.table_font_size,
            heading,
        );
    }

    let (month_col, amount_col) = (columns[0], columns[1]);
    for row in &card.month_rows {
        for (col_x, col_w) in columns {
            canvas.rect(col_x, row.y, col_w, g.row_height);
        }
        canvas.draw_centred_string(
            month_col.0 + month_col.1 / 2.0,
            row.y + g.cell_text_inset,
            g.table_font_size,
            &month_text(row.month),
        );
        if let Some(hint) = &row.amount_hint {
            canvas.set_fill_gray(g.prefill_gray);
            canvas.draw_centred_string(
                amount_col.0 + amount_col.1 / 2.0,
                row.y + g.cell_text_inset,
                g.table_font_size,
                hint,
            );
            canvas.set_fill_gray(0.0);
        }
    }

    canvas.draw_string(
        card.table_x,
        card.extra_caption_y + g.extra_caption_rise,
        g.table_font_size,
        EXTRA_CAPTION,
    );

    let label_width = g.extra_label_width();
    for row in &card.extra_rows {
        canvas.rect(card.table_x, row.y, label_width, g.extra_row_height);
        if !row.label.is_empty() {
            canvas.draw_string(
                card.table_x + g.extra_label_padding,
                row.y + g.cell_text_inset,
                row.font_size,
                &row.label,
            );
        }
        canvas.rect(
            card.table_x + label_width,
            row.y,
            g.extra_stamp_width,
            g.extra_row_height,
        );
    }
}

struct UsedGlyph {
    width: i64,
    text: Option<char>,
}

enum FontState<'a> {
    Embedded {
        font: &'a EmbeddedFont,
        face: Face<'a>,
        used: BTreeMap<u16, UsedGlyph>,
    },
    Helvetica,
}

/// Minimal page-at-a-time drawing surface on top of lopdf. Coordinates are
/// PDF points with the origin at the bottom-left of the page.
pub struct PdfCanvas<'a> {
    doc: Document,
    pages_id: ObjectId,
    font_id: ObjectId,
    page_ids: Vec<ObjectId>,
    operations: Vec<Operation>,
    page_width: f32,
    page_height: f32,
    font: FontState<'a>,
}

impl<'a> PdfCanvas<'a> {
    pub fn new(
        page_width: f32,
        page_height: f32,
        typeface: &'a Typeface,
    ) -> Result<Self, EnvelopeError> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.new_object_id();

        let font = match typeface {
            Typeface::Embedded(font) => FontState::Embedded {
                font,
                face: font.face()?,
                used: BTreeMap::new(),
            },
            Typeface::Fallback { .. } => FontState::Helvetica,
        };

        Ok(Self {
            doc,
            pages_id,
            font_id,
            page_ids: Vec::new(),
            operations: Vec::new(),
            page_width,
            page_height,
            font,
        })
    }

    pub fn set_line_width(&mut self, width: f32) {
        self.push("w", vec![Object::Real(width)]);
    }

    pub fn set_stroke_gray(&mut self, gray: f32) {
        self.push("G", vec![Object::Real(gray)]);
    }

    pub fn set_fill_gray(&mut self, gray: f32) {
        self.push("g", vec![Object::Real(gray)]);
    }

    /// Strokes a rectangle outline.
    pub fn rect(&mut self, x: f32, y: f32, width: f32, height: f32) {
        self.push(
            "re",
            vec![
                Object::Real(x),
                Object::Real(y),
                Object::Real(width),
                Object::Real(height),
            ],
        );
        self.push("S", vec![]);
    }

    pub fn draw_string(&mut self, x: f32, y: f32, size: f32, text: &str) {
        let encoded = self.encode(text);
        self.push("BT", vec![]);
        self.push(
            "Tf",
            vec![Object::Name(FONT_KEY.as_bytes().to_vec()), Object::Real(size)],
        );
        self.push("Td", vec![Object::Real(x), Object::Real(y)]);
        self.push("Tj", vec![encoded]);
        self.push("ET", vec![]);
    }

    pub fn draw_centred_string(&mut self, centre_x: f32, y: f32, size: f32, text: &str) {
        let width = self.text_width(text, size);
        self.draw_string(centre_x - width / 2.0, y, size, text);
    }

    /// Rendered width of `text` in points.
    pub fn text_width(&self, text: &str, size: f32) -> f32 {
        let units: i64 = match &self.font {
            FontState::Embedded { font, face, .. } => text
                .chars()
                .map(|ch| glyph_metrics(font, face, ch).1)
                .sum(),
            FontState::Helvetica => text
                .chars()
                .map(|ch| i64::from(helvetica_width(win_ansi_byte(ch))))
                .sum(),
        };
        units as f32 * size / 1000.0
    }

    /// Closes the current page and starts a new one.
    pub fn show_page(&mut self) -> Result<(), EnvelopeError> {
        let content = Content {
            operations: std::mem::take(&mut self.operations),
        };
        let content_id = self
            .doc
            .add_object(Stream::new(dictionary! {}, content.encode()?));
        let page_id = self.doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => self.pages_id,
            "Contents" => content_id,
        });
        self.page_ids.push(page_id);
        Ok(())
    }

    /// Flushes the last page, writes fonts and the page tree and returns
    /// the serialized document.
    pub fn finish(mut self) -> Result<Vec<u8>, EnvelopeError> {
        if !self.operations.is_empty() || self.page_ids.is_empty() {
            self.show_page()?;
        }

        let font = self.font_dictionary()?;
        self.doc
            .objects
            .insert(self.font_id, Object::Dictionary(font));

        let kids: Vec<Object> = self.page_ids.iter().map(|id| (*id).into()).collect();
        let pages = dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => Object::Integer(self.page_ids.len() as i64),
            "Resources" => dictionary! {
                "Font" => dictionary! {
                    FONT_KEY => self.font_id,
                },
            },
            "MediaBox" => vec![
                Object::Integer(0),
                Object::Integer(0),
                Object::Real(self.page_width),
                Object::Real(self.page_height),
            ],
        };
        self.doc
            .objects
            .insert(self.pages_id, Object::Dictionary(pages));

        let catalog_id = self.doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => self.pages_id,
        });
        self.doc.trailer.set("Root", catalog_id);
        self.doc.compress();

        let mut output_buffer: Vec<u8> = Vec::new();
        self.doc.save_to(&mut output_buffer)?;
        Ok(output_buffer)
    }

    fn push(&mut self, operator: &str, operands: Vec<Object>) {
        self.operations.push(Operation::new(operator, operands));
    }

    fn encode(&mut self, text: &str) -> Object {
        match &mut self.font {
            FontState::Embedded { font, face, used } => {
                let mut bytes = Vec::with_capacity(text.len() * 2);
                for ch in text.chars() {
                    let (gid, width) = glyph_metrics(font, face, ch);
                    bytes.extend_from_slice(&gid.to_be_bytes());
                    used.entry(gid).or_insert(UsedGlyph {
                        width,
                        text: (gid != 0).then_some(ch),
                    });
                }
                Object::String(bytes, StringFormat::Hexadecimal)
            }
            FontState::Helvetica => Object::String(
                text.chars().map(win_ansi_byte).collect(),
                StringFormat::Literal,
            ),
        }
    }

    fn font_dictionary(&mut self) -> Result<Dictionary, EnvelopeError> {
        match &self.font {
            FontState::Helvetica => Ok(dictionary! {
                "Type" => "Font",
                "Subtype" => "Type1",
                "BaseFont" => "Helvetica",
                "Encoding" => "WinAnsiEncoding",
            }),
            FontState::Embedded { font, used, .. } => {
                let base_font = Object::Name(font.name.as_bytes().to_vec());

                // already deflated, so `Document::compress` leaves it alone
                let file_id = self.doc.add_object(font.font_file().clone());

                let descriptor_id = self.doc.add_object(dictionary! {
                    "Type" => "FontDescriptor",
                    "FontName" => base_font.clone(),
                    "Flags" => Object::Integer(4),
                    "FontBBox" => font.bbox.iter().map(|v| Object::Integer(*v)).collect::<Vec<_>>(),
                    "ItalicAngle" => Object::Integer(0),
                    "Ascent" => Object::Integer(font.ascent),
                    "Descent" => Object::Integer(font.descent),
                    "CapHeight" => Object::Integer(font.cap_height),
                    "StemV" => Object::Integer(80),
                    "FontFile2" => file_id,
                });

                let mut widths = Vec::with_capacity(used.len() * 2);
                for (gid, glyph) in used {
                    widths.push(Object::Integer(i64::from(*gid)));
                    widths.push(Object::Array(vec![Object::Integer(glyph.width)]));
                }

                let cid_font_id = self.doc.add_object(dictionary! {
                    "Type" => "Font",
                    "Subtype" => "CIDFontType2",
                    "BaseFont" => base_font.clone(),
                    "CIDSystemInfo" => dictionary! {
                        "Registry" => Object::string_literal("Adobe"),
                        "Ordering" => Object::string_literal("Identity"),
                        "Supplement" => Object::Integer(0),
                    },
                    "FontDescriptor" => descriptor_id,
                    "DW" => Object::Integer(1000),
                    "W" => widths,
                    "CIDToGIDMap" => "Identity",
                });

                let to_unicode_id = self
                    .doc
                    .add_object(Stream::new(dictionary! {}, to_unicode_cmap(used).into_bytes()));

                Ok(dictionary! {
                    "Type" => "Font",
                    "Subtype" => "Type0",
                    "BaseFont" => base_font,
                    "Encoding" => "Identity-H",
                    "DescendantFonts" => vec![Object::Reference(cid_font_id)],
                    "ToUnicode" => to_unicode_id,
                })
            }
        }
    }
}

/// Glyph id and advance width (1/1000 em) of `ch`, `.notdef` when missing.
fn glyph_metrics(font: &EmbeddedFont, face: &Face<'_>, ch: char) -> (u16, i64) {
    let gid = face.glyph_index(ch).unwrap_or(ttf_parser::GlyphId(0));
    let advance = face.glyph_hor_advance(gid).unwrap_or(0);
    let width = i64::from(advance) * 1000 / i64::from(font.units_per_em().max(1));
    (gid.0, width)
}

fn to_unicode_cmap(used: &BTreeMap<u16, UsedGlyph>) -> String {
    let entries: Vec<String> = used
        .iter()
        .filter_map(|(gid, glyph)| glyph.text.map(|ch| (gid, ch)))
        .map(|(gid, ch)| {
            let mut units = [0u16; 2];
            let utf16: String = ch
                .encode_utf16(&mut units)
                .iter()
                .map(|unit| format!("{:04X}", unit))
                .collect();
            format!("<{:04X}> <{}>", gid, utf16)
        })
        .collect();

    let mut cmap = String::from(
        "/CIDInit /ProcSet findresource begin\n\
         12 dict begin\n\
         begincmap\n\
         /CIDSystemInfo << /Registry (Adobe) /Ordering (UCS) /Supplement 0 >> def\n\
         /CMapName /Adobe-Identity-UCS def\n\
         /CMapType 2 def\n\
         1 begincodespacerange\n\
         <0000> <FFFF>\n\
         endcodespacerange\n",
    );
    // bfchar blocks hold at most 100 entries
    for chunk in entries.chunks(100) {
        cmap.push_str(&format!("{} beginbfchar\n", chunk.len()));
        for entry in chunk {
            cmap.push_str(entry);
            cmap.push('\n');
        }
        cmap.push_str("endbfchar\n");
    }
    cmap.push_str(
        "endcmap\n\
         CMapName currentdict /CMap defineresource pop\n\
         end\n\
         end\n",
    );
    cmap
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page_operators(bytes: &[u8]) -> Vec<Vec<String>> {
        let doc = Document::load_mem(bytes).unwrap();
        doc.get_pages()
            .values()
            .map(|page_id| {
                let content = doc.get_page_content(*page_id).unwrap();
                Content::decode(&content)
                    .unwrap()
                    .operations
                    .into_iter()
                    .map(|op| op.operator)
                    .collect()
            })
            .collect()
    }

    #[test]
    fn canvas_writes_one_page_per_show_page() {
        let typeface = Typeface::fallback("test");
        let mut canvas = PdfCanvas::new(200.0, 100.0, &typeface).unwrap();
        canvas.rect(10.0, 10.0, 20.0, 20.0);
        canvas.show_page().unwrap();
        canvas.draw_string(10.0, 10.0, 12.0, "Hello");
        let bytes = canvas.finish().unwrap();

        let operators = page_operators(&bytes);
        assert_eq!(operators.len(), 2);
        assert_eq!(operators[0], vec!["re", "S"]);
        assert_eq!(operators[1], vec!["BT", "Tf", "Td", "Tj", "ET"]);
    }

    #[test]
    fn finishing_an_empty_canvas_still_yields_a_page() {
        let typeface = Typeface::fallback("test");
        let canvas = PdfCanvas::new(200.0, 100.0, &typeface).unwrap();
        let bytes = canvas.finish().unwrap();
        assert_eq!(Document::load_mem(&bytes).unwrap().get_pages().len(), 1);
    }

    #[test]
    fn helvetica_width_drives_centring() {
        let typeface = Typeface::fallback("test");
        let canvas = PdfCanvas::new(200.0, 100.0, &typeface).unwrap();
        // "00" is two 556-unit digits
        assert!((canvas.text_width("00", 10.0) - 11.12).abs() < 0.001);
    }

    #[test]
    fn fallback_font_is_helvetica() {
        let typeface = Typeface::fallback("test");
        let canvas = PdfCanvas::new(200.0, 100.0, &typeface).unwrap();
        let bytes = canvas.finish().unwrap();
        let doc = Document::load_mem(&bytes).unwrap();
        let has_helvetica = doc.objects.values().any(|object| {
            object
                .as_dict()
                .ok()
                .and_then(|dict| dict.get(b"BaseFont").ok())
                .and_then(|name| name.as_name().ok())
                == Some(b"Helvetica".as_slice())
        });
        assert!(has_helvetica);
    }

    #[test]
    fn to_unicode_maps_glyphs_to_utf16() {
        let mut used = BTreeMap::new();
        used.insert(0x0102, UsedGlyph { width: 1000, text: Some('年') });
        used.insert(0, UsedGlyph { width: 0, text: None });
        let cmap = to_unicode_cmap(&used);
        assert!(cmap.contains("1 beginbfchar\n<0102> <5E74>\n"));
    }

    #[test]
    fn suggested_filename_carries_the_year() {
        assert_eq!(suggested_filename(2025), "shukin_bukuro_2025.pdf");
    }
}
