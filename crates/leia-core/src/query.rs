//! Keyword classification of student chat queries.
//!
//! Only the category is recorded on `CHAT_INTERACTION` events; the message
//! content itself never enters the pipeline.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Kind of help a student asked for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QueryCategory {
    /// Explain a concept.
    ConceptExplanation,
    /// Help fixing broken code.
    CodeDebugging,
    /// Review or improve existing code.
    CodeReview,
    /// Recommended practices.
    BestPractices,
    /// Algorithms and complexity.
    AlgorithmHelp,
    /// Libraries and frameworks.
    LibraryUsage,
    /// Language syntax.
    SyntaxHelp,
    /// Project structure and design.
    ProjectPlanning,
    /// Anything else.
    GeneralQuestion,
}

impl QueryCategory {
    /// Wire representation.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ConceptExplanation => "CONCEPT_EXPLANATION",
            Self::CodeDebugging => "CODE_DEBUGGING",
            Self::CodeReview => "CODE_REVIEW",
            Self::BestPractices => "BEST_PRACTICES",
            Self::AlgorithmHelp => "ALGORITHM_HELP",
            Self::LibraryUsage => "LIBRARY_USAGE",
            Self::SyntaxHelp => "SYNTAX_HELP",
            Self::ProjectPlanning => "PROJECT_PLANNING",
            Self::GeneralQuestion => "GENERAL_QUESTION",
        }
    }
}

impl fmt::Display for QueryCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Checked in order; the first category with a matching keyword wins.
const KEYWORDS: &[(QueryCategory, &[&str])] = &[
    (
        QueryCategory::ConceptExplanation,
        &["qué es", "explica", "definición", "concepto", "cómo funciona", "qué significa", "what is", "explain"],
    ),
    (
        QueryCategory::CodeDebugging,
        &["error", "debug", "fallo", "excepción", "no funciona", "corregir", "solucionar", "exception", "fix"],
    ),
    (
        QueryCategory::CodeReview,
        &["revisar", "review", "mejorar", "optimizar", "refactorizar", "refactor"],
    ),
    (
        QueryCategory::BestPractices,
        &["mejor manera", "buenas prácticas", "recomendación", "estándar", "best practice"],
    ),
    (
        QueryCategory::AlgorithmHelp,
        &["algoritmo", "eficiencia", "complejidad", "ordenar", "buscar", "algorithm"],
    ),
    (
        QueryCategory::LibraryUsage,
        &["librería", "framework", "biblioteca", "npm", "package", "módulo", "library"],
    ),
    (
        QueryCategory::SyntaxHelp,
        &["sintaxis", "escribir", "declarar", "definir", "uso correcto", "syntax"],
    ),
    (
        QueryCategory::ProjectPlanning,
        &["planificar", "estructura", "diseño", "arquitectura", "organizar", "architecture"],
    ),
];

/// Classify a query by case-insensitive keyword match.
#[must_use]
pub fn classify_query(query: &str) -> QueryCategory {
    let lower = query.to_lowercase();
    KEYWORDS
        .iter()
        .find(|(_, words)| words.iter().any(|w| lower.contains(w)))
        .map_or(QueryCategory::GeneralQuestion, |(category, _)| *category)
}
