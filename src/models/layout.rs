use serde::{Deserialize, Serialize};
use std::fmt;

/// Millimetres to PDF points.
pub const fn mm(value: f32) -> f32 {
    value * 72.0 / 25.4
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

/// Fixed geometry of one physical sheet layout. All lengths are in points,
/// vertical offsets are measured down from the top edge of the card.
#[derive(Debug, Clone, PartialEq)]
pub struct LayoutGeometry {
    pub page_width: f32,
    pub page_height: f32,
    pub label_width: f32,
    pub label_height: f32,
    /// Bottom-left corner of every slot on a page, in fill order.
    pub slot_origins: &'static [Point],

    pub title_offset: f32,
    pub title_font_size: f32,
    pub name_offset: f32,
    pub name_font_size: f32,
    /// `None` leaves the fee summary line off the card.
    pub fee_line_offset: Option<f32>,
    pub fee_font_size: f32,

    pub month_table_offset: f32,
    pub row_height: f32,
    pub month_column_width: f32,
    pub amount_column_width: f32,
    pub stamp_column_width: f32,
    pub table_font_size: f32,
    /// Gap between a cell's bottom edge and the text baseline.
    pub cell_text_inset: f32,
    /// Prints the resolved fee faintly in every amount cell.
    pub amount_prefill: bool,
    pub prefill_gray: f32,

    pub extra_caption_gap: f32,
    /// Caption baseline above the first extra-items row.
    pub extra_caption_rise: f32,
    pub extra_row_height: f32,
    pub extra_stamp_width: f32,
    pub extra_label_padding: f32,
}

const LANDSCAPE_SLOTS: [Point; 3] = [
    Point { x: mm(21.0), y: mm(5.0) },
    Point { x: mm(106.0), y: mm(5.0) },
    Point { x: mm(191.0), y: mm(5.0) },
];

const PORTRAIT_SLOTS: [Point; 2] = [
    Point { x: mm(20.0), y: mm(48.5) },
    Point { x: mm(105.0), y: mm(48.5) },
];

/// A4 landscape, three 85x200 mm labels side by side.
pub const LANDSCAPE: LayoutGeometry = LayoutGeometry {
    page_width: mm(297.0),
    page_height: mm(210.0),
    label_width: mm(85.0),
    label_height: mm(200.0),
    slot_origins: &LANDSCAPE_SLOTS,
    title_offset: mm(12.0),
    title_font_size: 14.0,
    name_offset: mm(22.0),
    name_font_size: 16.0,
    fee_line_offset: Some(mm(30.0)),
    fee_font_size: 11.0,
    month_table_offset: mm(35.0),
    row_height: mm(8.0),
    month_column_width: mm(15.0),
    amount_column_width: mm(25.0),
    stamp_column_width: mm(30.0),
    table_font_size: 10.0,
    cell_text_inset: mm(2.5),
    amount_prefill: false,
    prefill_gray: 0.6,
    extra_caption_gap: mm(8.0),
    extra_caption_rise: mm(2.0),
    extra_row_height: mm(8.0),
    extra_stamp_width: mm(25.0),
    extra_label_padding: mm(2.0),
};

/// A4 portrait, two 85x200 mm labels in a left and right column.
pub const PORTRAIT: LayoutGeometry = LayoutGeometry {
    page_width: mm(210.0),
    page_height: mm(297.0),
    label_width: mm(85.0),
    label_height: mm(200.0),
    slot_origins: &PORTRAIT_SLOTS,
    title_offset: mm(12.0),
    title_font_size: 14.0,
    name_offset: mm(22.0),
    name_font_size: 16.0,
    fee_line_offset: None,
    fee_font_size: 11.0,
    month_table_offset: mm(30.0),
    row_height: mm(8.0),
    month_column_width: mm(15.0),
    amount_column_width: mm(25.0),
    stamp_column_width: mm(30.0),
    table_font_size: 10.0,
    cell_text_inset: mm(2.5),
    amount_prefill: true,
    prefill_gray: 0.6,
    extra_caption_gap: mm(8.0),
    extra_caption_rise: mm(2.0),
    extra_row_height: mm(8.0),
    extra_stamp_width: mm(25.0),
    extra_label_padding: mm(2.0),
};

impl LayoutGeometry {
    pub fn labels_per_page(&self) -> usize {
        self.slot_origins.len()
    }

    pub fn table_width(&self) -> f32 {
        self.month_column_width + self.amount_column_width + self.stamp_column_width
    }

    pub fn extra_label_width(&self) -> f32 {
        self.table_width() - self.extra_stamp_width
    }
}

/// Named choice between the two supported geometries.
#[derive(
    Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum LayoutPreset {
    #[default]
    Landscape,
    Portrait,
}

impl LayoutPreset {
    pub fn geometry(self) -> &'static LayoutGeometry {
        match self {
            LayoutPreset::Landscape => &LANDSCAPE,
            LayoutPreset::Portrait => &PORTRAIT,
        }
    }
}

impl fmt::Display for LayoutPreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LayoutPreset::Landscape => write!(f, "landscape"),
            LayoutPreset::Portrait => write!(f, "portrait"),
        }
    }
}
