//! Check requests.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use acctcheck_sources::MAX_CANDIDATE_LENGTH;
use serde_json::Value;

use super::category::Category;
use crate::error::{DomainError, DomainResult};

/// Maximum number of candidates accepted per category.
pub const MAX_CANDIDATES_PER_CATEGORY: usize = 1000;

/// Immutable mapping from category to its ordered candidate list.
///
/// Built once at request entry and never mutated. A category present with an
/// empty list is kept so it can be echoed back in the report, but it is never
/// dispatched. Repeated candidates within a category are collapsed, keeping the
/// first occurrence.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CheckRequest {
    entries: BTreeMap<Category, Arc<[String]>>,
}

impl CheckRequest {
    /// Builds a request from category/candidate pairs, validating every candidate.
    ///
    /// A category given twice has its lists concatenated before de-duplication.
    pub fn new<I, C, S>(entries: I) -> DomainResult<Self>
    where
        I: IntoIterator<Item = (Category, C)>,
        C: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut merged: BTreeMap<Category, Vec<String>> = BTreeMap::new();
        for (category, candidates) in entries {
            merged
                .entry(category)
                .or_default()
                .extend(candidates.into_iter().map(Into::into));
        }

        let mut request = Self::default();
        for (category, candidates) in merged {
            let candidates = normalize(category, candidates)?;
            request.entries.insert(category, candidates);
        }
        Ok(request)
    }

    /// Parses a request from its JSON form: an object mapping category names to
    /// arrays of strings.
    pub fn from_json(value: &Value) -> DomainResult<Self> {
        let object = value
            .as_object()
            .ok_or_else(|| DomainError::MalformedRequest {
                message: "request body must be a JSON object".to_string(),
            })?;

        let mut entries = Vec::with_capacity(object.len());
        for (name, value) in object {
            let category: Category = name.parse()?;
            let items = value
                .as_array()
                .ok_or_else(|| DomainError::InvalidCandidates {
                    category: name.clone(),
                })?;

            let mut candidates = Vec::with_capacity(items.len());
            for (index, item) in items.iter().enumerate() {
                let candidate = item.as_str().ok_or_else(|| DomainError::InvalidCandidate {
                    category: name.clone(),
                    index,
                    message: "candidate must be a string".to_string(),
                })?;
                candidates.push(candidate.to_string());
            }
            entries.push((category, candidates));
        }

        Self::new(entries)
    }

    /// Builds a request from category wire names, as found in configuration.
    pub fn from_named<I, C, S>(entries: I) -> DomainResult<Self>
    where
        I: IntoIterator<Item = (String, C)>,
        C: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut parsed = Vec::new();
        for (name, candidates) in entries {
            parsed.push((name.parse::<Category>()?, candidates));
        }
        Self::new(parsed)
    }

    /// Candidates for `category`, or `None` when the category is not in the request.
    pub fn candidates(&self, category: Category) -> Option<&Arc<[String]>> {
        self.entries.get(&category)
    }

    /// Categories present in the request, including those with empty lists.
    pub fn categories(&self) -> impl Iterator<Item = Category> + '_ {
        self.entries.keys().copied()
    }

    /// Categories with at least one candidate, paired with their candidates.
    pub fn dispatchable(&self) -> impl Iterator<Item = (Category, &Arc<[String]>)> + '_ {
        self.entries
            .iter()
            .filter(|(_, candidates)| !candidates.is_empty())
            .map(|(category, candidates)| (*category, candidates))
    }

    /// Total number of candidates across categories.
    pub fn candidate_count(&self) -> usize {
        self.entries.values().map(|c| c.len()).sum()
    }

    /// Returns true when no category carries a candidate.
    pub fn is_empty(&self) -> bool {
        self.candidate_count() == 0
    }
}

fn normalize(category: Category, candidates: Vec<String>) -> DomainResult<Arc<[String]>> {
    if candidates.len() > MAX_CANDIDATES_PER_CATEGORY {
        return Err(DomainError::TooManyCandidates {
            category: category.to_string(),
            count: candidates.len(),
            max: MAX_CANDIDATES_PER_CATEGORY,
        });
    }

    let mut seen = HashSet::with_capacity(candidates.len());
    let mut unique = Vec::with_capacity(candidates.len());
    for (index, candidate) in candidates.into_iter().enumerate() {
        if candidate.trim().is_empty() {
            return Err(DomainError::InvalidCandidate {
                category: category.to_string(),
                index,
                message: "candidate cannot be empty".to_string(),
            });
        }
        if candidate.len() > MAX_CANDIDATE_LENGTH {
            return Err(DomainError::InvalidCandidate {
                category: category.to_string(),
                index,
                message: format!("candidate exceeds maximum length of {MAX_CANDIDATE_LENGTH} bytes"),
            });
        }
        if seen.insert(candidate.clone()) {
            unique.push(candidate);
        }
    }
    Ok(unique.into())
}
