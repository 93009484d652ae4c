//! DL 節モデル
//!
//! このクレートはハイパーテーブルロー推論器の入力語彙を提供します:
//! - 概念・ロール・等価述語と DL 節 (body → head)
//! - 基底選言事実と知識ベースフラグ
//! - 入力検証 (アリティ、安全性、at-least の形)
//! - JSON および節記法ローダー

pub mod model;
pub mod validation;
pub mod loader;
pub mod syntax;

pub use model::{
    AtLeast, Atom, ClauseHead, Concept, DLClause, DLPredicate, GroundAtom, GroundFact, Individual, KnowledgeBase,
    KnowledgeBaseFlags, Role, Term,
};
pub use loader::{load_path, ClauseNotationLoader, JsonKnowledgeBaseLoader, KnowledgeBaseLoader};
pub use syntax::{parse_clause, parse_fact, parse_knowledge_base};
pub use validation::validate_clause;

// Error types
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ModelError {
    #[error("Arity mismatch in {context}: {predicate} expects {expected} argument(s), found {found}")]
    ArityMismatch {
        context: String,
        predicate: String,
        expected: usize,
        found: usize,
    },

    #[error("Illegal body atom {atom} in clause {clause}")]
    IllegalBodyAtom { clause: String, atom: String },

    #[error("Head variable {variable} is not bound by the body of clause {clause}")]
    UnsafeVariable { clause: String, variable: String },

    #[error("Invalid at-least restriction: {0}")]
    InvalidAtLeast(String),

    #[error("Ground fact #{0} has no disjuncts")]
    EmptyFact(usize),

    #[error("Inconsistent knowledge base flags: {0}")]
    InconsistentFlags(String),

    #[error("Syntax error at byte {offset}: {message}")]
    Syntax { offset: usize, message: String },

    #[error("Loader error: {0}")]
    LoaderError(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
