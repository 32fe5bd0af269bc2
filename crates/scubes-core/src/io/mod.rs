pub mod fits;
pub mod fits_header;
pub mod fits_table;
pub mod fits_writer;
pub mod image_io;
pub mod npy;
mod records;

pub use fits::{Bitpix, FitsFile, Hdu, HduData, ImageData};
pub use fits_header::{Card, Header, Value};
pub use fits_table::{BinTable, Column, ColumnData};
pub use fits_writer::{update_header, write_hdus};
