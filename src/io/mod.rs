//! File input and output.

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use anyhow::{self, format_err};
use bincode;
use serde::{de::DeserializeOwned, Serialize};
use serde_yaml;

pub(crate) mod format;
pub mod poscar;


/// Binary file types written by the engine.
pub enum ProtoMatchFileType {
    /// Prototype resolution results.
    Res,
}

impl ProtoMatchFileType {
    /// Returns the extension of the file type.
    pub fn ext(&self) -> String {
        match self {
            ProtoMatchFileType::Res => "protomatch.res".to_string(),
        }
    }
}

/// Reads a binary file and deserialises it.
///
/// # Arguments
///
/// * `name` - The name of the file to be read in (without its extension).
/// * `file_type` - The type of the file to be read in.
pub fn read_protomatch_binary<T, P: AsRef<Path>>(
    name: P,
    file_type: ProtoMatchFileType,
) -> Result<T, anyhow::Error>
where
    T: DeserializeOwned,
{
    let mut path = name.as_ref().to_path_buf();
    path.set_extension(file_type.ext());
    let mut reader = BufReader::new(File::open(path).map_err(|err| format_err!(err))?);
    bincode::deserialize_from(&mut reader).map_err(|err| format_err!(err))
}

/// Serialises a value into a binary file.
///
/// # Arguments
///
/// * `name` - The name of the file to be written (without its extension).
/// * `file_type` - The type of the file to be written.
/// * `value` - The value to serialise.
pub fn write_protomatch_binary<T, P: AsRef<Path>>(
    name: P,
    file_type: ProtoMatchFileType,
    value: &T,
) -> Result<(), anyhow::Error>
where
    T: Serialize,
{
    let mut path = name.as_ref().to_path_buf();
    path.set_extension(file_type.ext());
    let mut writer = BufWriter::new(File::create(path)?);
    bincode::serialize_into(&mut writer, value).map_err(|err| format_err!(err))
}

/// Reads a YAML configuration file and deserialises it.
pub fn read_protomatch_yaml<T, P: AsRef<Path>>(name: P) -> Result<T, anyhow::Error>
where
    T: DeserializeOwned,
{
    let mut reader = BufReader::new(File::open(name).map_err(|err| format_err!(err))?);
    serde_yaml::from_reader(&mut reader).map_err(|err| format_err!(err))
}

/// Serialises a value into a YAML file with the `.yml` extension.
pub fn write_protomatch_yaml<T, P: AsRef<Path>>(name: P, value: &T) -> Result<(), anyhow::Error>
where
    T: Serialize,
{
    let mut path = name.as_ref().to_path_buf();
    path.set_extension("yml");
    let mut writer = BufWriter::new(File::create(path)?);
    serde_yaml::to_writer(&mut writer, value).map_err(|err| format_err!(err))
}
