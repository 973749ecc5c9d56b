//! Pagination and card layout.
//!
//! `plan_sheets` turns a roster into a page-by-page plan of cards. Every
//! coordinate on the plan is final, so rendering is a straight walk over it.

use tracing::info;

use crate::error::EnvelopeError;
use crate::models::layout::{LayoutGeometry, Point};
use crate::models::roster::{
    EXTRA_ITEM_ROWS, MemberRecord, RosterConfiguration, group_thousands,
};

/// Month order of an April-start fiscal year.
pub const FISCAL_MONTHS: [u32; 12] = [4, 5, 6, 7, 8, 9, 10, 11, 12, 1, 2, 3];

pub const MONTH_HEADER: [&str; 3] = ["月", "金額", "受領印"];
pub const EXTRA_CAPTION: &str = "■ 臨時集金など";

#[derive(Debug, Clone, PartialEq)]
pub struct SheetPlan {
    pub page_width: f32,
    pub page_height: f32,
    pub pages: Vec<PagePlan>,
}

impl SheetPlan {
    pub fn card_count(&self) -> usize {
        self.pages.iter().map(|page| page.cards.len()).sum()
    }

    pub fn cards(&self) -> impl Iterator<Item = &CardPlan> {
        self.pages.iter().flat_map(|page| page.cards.iter())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PagePlan {
    pub cards: Vec<CardPlan>,
}

/// One label card. `origin` is the bottom-left corner of the border.
#[derive(Debug, Clone, PartialEq)]
pub struct CardPlan {
    pub record_index: usize,
    pub slot: usize,
    pub origin: Point,
    pub title: String,
    pub name_line: String,
    pub fee_line: Option<String>,
    /// Left edge of both tables.
    pub table_x: f32,
    /// Bottom edge of the month table header row.
    pub month_header_y: f32,
    pub month_rows: Vec<MonthRow>,
    pub extra_caption_y: f32,
    pub extra_rows: Vec<ExtraRow>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MonthRow {
    pub month: u32,
    /// Bottom edge of the row.
    pub y: f32,
    /// Faint amount printed as a payment reminder.
    pub amount_hint: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExtraRow {
    pub label: String,
    pub font_size: f32,
    pub y: f32,
}

pub fn title_text(fiscal_year: i32) -> String {
    format!("{}年度 集金袋", fiscal_year)
}

pub fn name_text(name: &str) -> String {
    format!("{} 殿", name)
}

pub fn fee_text(fee: u32) -> String {
    format!("団費: ¥{}", group_thousands(fee))
}

pub fn month_text(month: u32) -> String {
    format!("{}月", month)
}

/// Shrinks long extra-item labels by character count. This is a cheap fit,
/// not a measurement of the rendered width.
pub fn extra_label_font_size(label: &str) -> f32 {
    match label.chars().count() {
        n if n > 10 => 6.0,
        n if n > 7 => 7.0,
        _ => 8.0,
    }
}

/// Page index and slot of the record at `index`.
pub fn slot_of(index: usize, labels_per_page: usize) -> (usize, usize) {
    (index / labels_per_page, index % labels_per_page)
}

pub fn page_count(records: usize, labels_per_page: usize) -> usize {
    records.div_ceil(labels_per_page)
}

pub fn plan_sheets(
    roster: &[MemberRecord],
    config: &RosterConfiguration,
    geometry: &LayoutGeometry,
) -> Result<SheetPlan, EnvelopeError> {
    if roster.is_empty() {
        return Err(EnvelopeError::EmptyRoster);
    }

    let per_page = geometry.labels_per_page();
    let mut pages: Vec<PagePlan> = Vec::with_capacity(page_count(roster.len(), per_page));

    for (index, record) in roster.iter().enumerate() {
        let (_, slot) = slot_of(index, per_page);
        if slot == 0 {
            pages.push(PagePlan { cards: Vec::with_capacity(per_page) });
        }
        let card = plan_card(index, slot, record, config, geometry);
        if let Some(page) = pages.last_mut() {
            page.cards.push(card);
        }
    }

    info!(
        "Planned {} card(s) on {} page(s), {} per page",
        roster.len(),
        pages.len(),
        per_page
    );

    Ok(SheetPlan {
        page_width: geometry.page_width,
        page_height: geometry.page_height,
        pages,
    })
}

fn plan_card(
    record_index: usize,
    slot: usize,
    record: &MemberRecord,
    config: &RosterConfiguration,
    geometry: &LayoutGeometry,
) -> CardPlan {
    let origin = geometry.slot_origins[slot];
    let top = origin.y + geometry.label_height;
    let fee = record.resolved_fee(config);

    let table_x = origin.x + (geometry.label_width - geometry.table_width()) / 2.0;
    let header_y = top - geometry.month_table_offset - geometry.row_height;

    let amount_hint = geometry.amount_prefill.then(|| group_thousands(fee));
    let month_rows = FISCAL_MONTHS
        .iter()
        .enumerate()
        .map(|(i, &month)| MonthRow {
            month,
            y: header_y - (i as f32 + 1.0) * geometry.row_height,
            amount_hint: amount_hint.clone(),
        })
        .collect::<Vec<_>>();

    let table_bottom = header_y - FISCAL_MONTHS.len() as f32 * geometry.row_height;
    let extra_caption_y = table_bottom - geometry.extra_caption_gap;

    let extra_rows = (0..EXTRA_ITEM_ROWS)
        .map(|row| {
            let label = config.extra_item_label(row).to_string();
            ExtraRow {
                font_size: extra_label_font_size(&label),
                y: extra_caption_y - (row as f32 + 1.0) * geometry.extra_row_height,
                label,
            }
        })
        .collect();

    CardPlan {
        record_index,
        slot,
        origin,
        title: title_text(config.fiscal_year),
        name_line: name_text(&record.name),
        fee_line: geometry.fee_line_offset.map(|_| fee_text(fee)),
        table_x,
        month_header_y: header_y,
        month_rows,
        extra_caption_y,
        extra_rows,
    }
}
