//! `name,measurement_unit` CSV files: the importer's input and the memory backend's seed.

use std::{
    fs::File,
    io,
    path::{Path, PathBuf},
};

use thiserror::Error;

use crate::database::models::ingredient::NewIngredient;

#[derive(Error, Debug)]
pub enum IngredientFileError {
    #[error("unable to open {path}: {source}")]
    Open { path: PathBuf, source: io::Error },

    #[error("malformed csv: {0}")]
    Csv(#[from] csv::Error),

    #[error("row {row}: name and measurement unit must not be empty")]
    EmptyField { row: usize },
}

pub fn read_ingredients(path: &Path) -> Result<Vec<NewIngredient>, IngredientFileError> {
    let file = File::open(path).map_err(|source| IngredientFileError::Open {
        path: path.to_owned(),
        source,
    })?;

    parse_ingredients(file)
}

/// The first row is a header and is skipped; fields are trimmed.
fn parse_ingredients(reader: impl io::Read) -> Result<Vec<NewIngredient>, IngredientFileError> {
    csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(reader)
        .deserialize::<(String, String)>()
        .enumerate()
        .map(|(index, row)| {
            let (name, measurement_unit) = row?;
            if name.is_empty() || measurement_unit.is_empty() {
                // +2: one-based, after the header
                return Err(IngredientFileError::EmptyField { row: index + 2 });
            }
            Ok(NewIngredient::new(name, measurement_unit))
        })
        .collect()
}
