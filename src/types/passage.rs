//! Retrievable passages and their fused rankings

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::types::query::Strategy;

/// Where a passage came from
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceMeta {
    /// Parent document identifier
    pub document_id: String,
    /// Document title, if the index stores one
    pub title: Option<String>,
    /// Chunk offset within the parent document
    pub offset: Option<usize>,
}

impl SourceMeta {
    /// Attribution string rendered next to the passage in a context block
    pub fn attribution(&self) -> String {
        let mut label = match &self.title {
            Some(title) if !title.trim().is_empty() => {
                format!("{} ({})", title.trim(), self.document_id)
            }
            _ => self.document_id.clone(),
        };
        if let Some(offset) = self.offset {
            label.push_str(&format!(" @{}", offset));
        }
        label
    }
}

/// A unit of retrievable text, scored by the strategy that produced it.
///
/// Raw scores from different strategies live on different scales and are
/// only compared after per-list normalization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Passage {
    pub id: String,
    pub text: String,
    pub source: SourceMeta,
    pub score: f64,
    pub strategy: Strategy,
}

impl Passage {
    pub fn new(
        id: impl Into<String>,
        text: impl Into<String>,
        score: f64,
        strategy: Strategy,
    ) -> Self {
        let id = id.into();
        Self {
            source: SourceMeta {
                document_id: id.clone(),
                ..Default::default()
            },
            id,
            text: text.into(),
            score,
            strategy,
        }
    }

    pub fn with_source(mut self, source: SourceMeta) -> Self {
        self.source = source;
        self
    }
}

/// Split free text into one passage per blank-line separated paragraph.
///
/// Ids are `{document_id}#{n}` with `n` counted from 1; each passage
/// records its paragraph index as the source offset.
pub fn paragraphs(document_id: &str, text: &str, strategy: Strategy) -> Vec<Passage> {
    let mut blocks: Vec<Vec<&str>> = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            if !current.is_empty() {
                blocks.push(std::mem::take(&mut current));
            }
        } else {
            current.push(line);
        }
    }
    if !current.is_empty() {
        blocks.push(current);
    }

    blocks
        .into_iter()
        .enumerate()
        .map(|(idx, lines)| {
            let n = idx + 1;
            Passage::new(format!("{}#{}", document_id, n), lines.join("\n"), 1.0, strategy)
                .with_source(SourceMeta {
                    document_id: document_id.to_string(),
                    title: None,
                    offset: Some(n),
                })
        })
        .collect()
}

/// Passage after fusion.
///
/// Within one fused list `fused_score` never increases with `rank`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedPassage {
    pub passage: Passage,
    /// 1-based position in the fused list
    pub rank: usize,
    /// Strategy-weighted score scaled into [0, 1]
    pub fused_score: f64,
    /// Unscaled max of weight(s) x normalized score
    pub weighted_score: f64,
    /// Strategies that returned this passage
    pub provenance: BTreeSet<Strategy>,
}

impl RankedPassage {
    pub fn id(&self) -> &str {
        &self.passage.id
    }
}
