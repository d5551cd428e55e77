//! Shared constants and value types for the analysis pipelines.

use serde::{Deserialize, Serialize};

/// Supported reference genome builds. The first entry is the default.
pub const VALID_GENOMES: [&str; 2] = ["hg19", "hg38"];

pub fn default_genome() -> &'static str {
    VALID_GENOMES[0]
}

pub fn is_valid_genome(genome: &str) -> bool {
    VALID_GENOMES.contains(&genome)
}

/// Comparison operator for a variant filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterOperator {
    Lt,
    Lte,
    Gt,
    Gte,
}

impl FilterOperator {
    pub const ALL: [FilterOperator; 4] = [
        FilterOperator::Lt,
        FilterOperator::Lte,
        FilterOperator::Gt,
        FilterOperator::Gte,
    ];

    /// The parameter-document spellings, in the same order as [`Self::ALL`].
    pub const KEYS: [&'static str; 4] = ["lt", "lte", "gt", "gte"];

    pub fn parse(key: &str) -> Option<Self> {
        match key {
            "lt" => Some(Self::Lt),
            "lte" => Some(Self::Lte),
            "gt" => Some(Self::Gt),
            "gte" => Some(Self::Gte),
            _ => None,
        }
    }

    /// The operator symbol embedded in filter expressions.
    pub fn symbol(self) -> &'static str {
        match self {
            Self::Lt => "<",
            Self::Lte => "<=",
            Self::Gt => ">",
            Self::Gte => ">=",
        }
    }
}

/// Format a compact filter expression for a command-line flag,
/// e.g. `DP<0.00` or `AF<=0.40`.
pub fn format_filter(field: &str, operator: FilterOperator, value: f64) -> String {
    format!("{field}{}{value:.2}", operator.symbol())
}
