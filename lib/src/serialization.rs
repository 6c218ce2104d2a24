use std::io::{Read, Write};

use crate::errors::KmerResult;
use crate::extract::FeatureMatrix;

pub const MATRIX_EXT: &str = ".json";

pub fn write_feature_matrix(writer: &mut dyn Write, matrix: &FeatureMatrix) -> KmerResult<()> {
    serde_json::to_writer(writer, matrix)?;
    Ok(())
}

pub fn read_feature_matrix(reader: &mut dyn Read) -> KmerResult<FeatureMatrix> {
    Ok(serde_json::from_reader(reader)?)
}
