use fitsio::tables::{ColumnDataType, ColumnDescription, ConcreteColumnDescription};

use crate::error::{Result, ScubesError};

/// Values of one binary-table column.
#[derive(Clone, Debug, PartialEq)]
pub enum ColumnData {
    /// Fixed-width character column (`nA`).
    Text(Vec<String>),
    /// Floating point column, read and written as double precision.
    Float(Vec<f64>),
    /// Integer column, widened to 64 bits on read.
    Integer(Vec<i64>),
}

impl ColumnData {
    pub fn len(&self) -> usize {
        match self {
            ColumnData::Text(v) => v.len(),
            ColumnData::Float(v) => v.len(),
            ColumnData::Integer(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Storage type of the column; text columns are as wide as their
    /// longest value.
    fn description(&self, name: &str) -> ColumnDescription {
        let mut column = ColumnDescription::new(name);
        match self {
            ColumnData::Text(v) => {
                let width = v.iter().map(|s| s.len()).max().unwrap_or(0).max(1);
                column.with_type(ColumnDataType::String).that_repeats(width).clone()
            }
            ColumnData::Float(_) => column.with_type(ColumnDataType::Double).clone(),
            ColumnData::Integer(_) => column.with_type(ColumnDataType::Long).clone(),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Column {
    pub name: String,
    pub data: ColumnData,
}

/// In-memory binary table.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BinTable {
    pub columns: Vec<Column>,
}

impl BinTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, name: &str, data: ColumnData) {
        self.columns.push(Column {
            name: name.to_string(),
            data,
        });
    }

    pub fn rows(&self) -> usize {
        self.columns.first().map(|c| c.data.len()).unwrap_or(0)
    }

    pub fn column(&self, name: &str) -> Option<&ColumnData> {
        self.columns.iter().find(|c| c.name == name).map(|c| &c.data)
    }

    pub fn names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// Column layout used to create the table extension. All columns must
    /// have the same length.
    pub fn column_descriptions(&self) -> Result<Vec<ConcreteColumnDescription>> {
        let rows = self.rows();
        if self.columns.iter().any(|c| c.data.len() != rows) {
            return Err(ScubesError::InvalidFits("table columns differ in length".into()));
        }
        self.columns
            .iter()
            .map(|c| Ok(c.data.description(&c.name).create()?))
            .collect()
    }
}
