pub mod font;
pub mod layout;
pub mod pdf;
pub mod roster_csv;
