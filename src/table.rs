use std::collections::HashMap;

/// Columns of the company register that the search understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Column {
    OrganizationNumber,
    CompanyName,
    Employees,
    Turnover,
    Profit,
    EntityType,
    VisitingAddress,
    VisitingPostalArea,
    VisitingCounty,
    MunicipalityOfSeat,
    Sni,
}

/// Columns returned to the caller, in output order.
pub const OUTPUT_COLUMNS: [Column; 10] = [
    Column::OrganizationNumber,
    Column::CompanyName,
    Column::Employees,
    Column::Turnover,
    Column::Profit,
    Column::EntityType,
    Column::VisitingAddress,
    Column::VisitingPostalArea,
    Column::MunicipalityOfSeat,
    Column::Sni,
];

/// Location columns searched by the geography filter.
pub const GEOGRAPHY_COLUMNS: [Column; 3] = [
    Column::VisitingCounty,
    Column::VisitingPostalArea,
    Column::MunicipalityOfSeat,
];

impl Column {
    /// Header text as it appears in the source file.
    pub const fn header(self) -> &'static str {
        match self {
            Column::OrganizationNumber => "Organization number",
            Column::CompanyName => "Company name",
            Column::Employees => "2024- Employees",
            Column::Turnover => "2024- Turnover",
            Column::Profit => "Profit",
            Column::EntityType => "Entity type",
            Column::VisitingAddress => "Company visiting address",
            Column::VisitingPostalArea => "Company visiting postal area",
            Column::VisitingCounty => "Company visiting county",
            // Misspelled in the source data.
            Column::MunicipalityOfSeat => "Munipality of seat",
            Column::Sni => "SNI",
        }
    }

    pub const fn is_numeric(self) -> bool {
        matches!(self, Column::Employees | Column::Turnover | Column::Profit)
    }
}

/// In-memory copy of the dataset. Every cell is kept as nullable text; numeric
/// columns are parsed when read.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    headers: Vec<String>,
    positions: HashMap<String, usize>,
    rows: Vec<Vec<Option<String>>>,
}

impl Table {
    pub fn new(headers: Vec<String>, rows: Vec<Vec<Option<String>>>) -> Self {
        let positions = headers
            .iter()
            .enumerate()
            .map(|(idx, header)| (header.clone(), idx))
            .collect();
        Self {
            headers,
            positions,
            rows,
        }
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn has_column(&self, column: Column) -> bool {
        self.positions.contains_key(column.header())
    }

    /// Rows in file order.
    pub fn rows(&self) -> impl Iterator<Item = Row<'_>> {
        self.rows.iter().map(move |cells| Row { table: self, cells })
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Row<'a> {
    table: &'a Table,
    cells: &'a [Option<String>],
}

impl<'a> Row<'a> {
    /// Cell text; `None` for null cells and for columns the table lacks.
    pub fn text(&self, column: Column) -> Option<&'a str> {
        let idx = *self.table.positions.get(column.header())?;
        self.cells.get(idx)?.as_deref()
    }

    /// Cell parsed as a number; `None` when null or not numeric.
    pub fn number(&self, column: Column) -> Option<f64> {
        self.text(column)?.trim().parse::<f64>().ok()
    }
}
