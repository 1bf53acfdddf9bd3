//! Location vocabulary (canonical names with stable integer codes)

use crate::LoadError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;
use tracing::{info, warn};

/// Ordered canonical location names
///
/// A name's code is its position in the vocabulary. Codes are opaque join
/// keys into the records table, never magnitudes.
#[derive(Debug, Clone, Default)]
pub struct LocationVocabulary {
    names: Vec<String>,
    lowercase: Vec<String>,
    codes: HashMap<String, u32>,
}

/// On-disk encoder artifact
#[derive(Debug, Serialize, Deserialize)]
struct VocabularyFile {
    classes: Vec<String>,
}

impl LocationVocabulary {
    /// Build from names in the given order; blank names and case-insensitive
    /// duplicates are dropped (first occurrence keeps its position)
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut vocab = Self::default();
        for name in names {
            let name = name.into().trim().to_string();
            if name.is_empty() {
                continue;
            }
            let lower = name.to_lowercase();
            if vocab.codes.contains_key(&lower) {
                warn!("Duplicate vocabulary entry {:?} ignored", name);
                continue;
            }
            vocab.codes.insert(lower.clone(), vocab.names.len() as u32);
            vocab.lowercase.push(lower);
            vocab.names.push(name);
        }
        vocab
    }

    /// Label-encoder fit: sorted unique names
    pub fn fit<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let sorted: BTreeSet<String> = names
            .into_iter()
            .map(|n| n.into().trim().to_string())
            .filter(|n| !n.is_empty())
            .collect();
        Self::new(sorted)
    }

    /// Load from `{"classes": [...]}` or a bare JSON array
    pub fn load(path: impl AsRef<Path>) -> Result<Self, LoadError> {
        let path = path.as_ref();
        info!("Loading location vocabulary from {:?}", path);

        let reader = BufReader::new(File::open(path)?);
        let raw: serde_json::Value = serde_json::from_reader(reader)?;

        let names: Vec<String> = if let Some(classes) = raw.get("classes") {
            serde_json::from_value(classes.clone())?
        } else {
            serde_json::from_value(raw)?
        };

        let vocab = Self::new(names);
        info!("Loaded {} canonical locations", vocab.len());
        Ok(vocab)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), LoadError> {
        let writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(
            writer,
            &VocabularyFile {
                classes: self.names.clone(),
            },
        )?;
        Ok(())
    }

    /// Code for a name (case-insensitive, trimmed)
    pub fn code(&self, name: &str) -> Option<u32> {
        self.codes.get(&name.trim().to_lowercase()).copied()
    }

    pub fn name(&self, code: u32) -> Option<&str> {
        self.names.get(code as usize).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Names in vocabulary order
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }

    /// `(name, lowercase name)` pairs in vocabulary order
    pub(crate) fn iter_lowercase(&self) -> impl Iterator<Item = (&str, &str)> {
        self.names
            .iter()
            .zip(self.lowercase.iter())
            .map(|(n, l)| (n.as_str(), l.as_str()))
    }

    /// First `n` names, used as hints
    pub fn sample(&self, n: usize) -> Vec<String> {
        self.names.iter().take(n).cloned().collect()
    }
}
