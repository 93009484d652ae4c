//! 知識ベースローダー

use crate::model::KnowledgeBase;
use crate::syntax::parse_knowledge_base;
use crate::ModelError;
use std::path::Path;

/// Knowledge base loader trait
pub trait KnowledgeBaseLoader {
    fn load_from_str(&self, input: &str) -> Result<KnowledgeBase, ModelError>;

    fn load_from_path(&self, path: &Path) -> Result<KnowledgeBase, ModelError> {
        let input = std::fs::read_to_string(path)?;
        self.load_from_str(&input)
    }
}

/// Loads the serde JSON form of [`KnowledgeBase`]
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonKnowledgeBaseLoader;

impl KnowledgeBaseLoader for JsonKnowledgeBaseLoader {
    fn load_from_str(&self, input: &str) -> Result<KnowledgeBase, ModelError> {
        let knowledge_base: KnowledgeBase = serde_json::from_str(input)?;
        knowledge_base.validate()?;
        Ok(knowledge_base)
    }
}

/// Loads the textual clause notation, e.g. `A(x) -> B(x) | C(x).`
#[derive(Debug, Default, Clone, Copy)]
pub struct ClauseNotationLoader;

impl KnowledgeBaseLoader for ClauseNotationLoader {
    fn load_from_str(&self, input: &str) -> Result<KnowledgeBase, ModelError> {
        let knowledge_base = parse_knowledge_base(input)?;
        knowledge_base.validate()?;
        Ok(knowledge_base)
    }
}

/// Pick a loader from the file extension: `.json` or clause notation otherwise
pub fn load_path(path: &Path) -> Result<KnowledgeBase, ModelError> {
    match path.extension().and_then(|extension| extension.to_str()) {
        Some("json") => JsonKnowledgeBaseLoader.load_from_path(path),
        Some("dlc") | Some("txt") | None => ClauseNotationLoader.load_from_path(path),
        Some(other) => Err(ModelError::LoaderError(format!("unknown knowledge base format .{}", other))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Concept, DLPredicate};

    #[test]
    fn test_json_round_trip_through_loader() {
        let kb = ClauseNotationLoader
            .load_from_str("A(x) -> B(x) | C(x).\nA('a').")
            .unwrap();
        let json = serde_json::to_string(&kb).unwrap();

        let loaded = JsonKnowledgeBaseLoader.load_from_str(&json).unwrap();
        assert_eq!(loaded, kb);
    }

    #[test]
    fn test_json_loader_reads_hand_written_input() {
        let json = r#"{
            "clauses": [{
                "body": [{"predicate": {"concept": {"atomic": "A"}}, "arguments": [{"variable": "x"}]}],
                "head": {"conjunction": [{"predicate": {"concept": "nothing"}, "arguments": [{"variable": "x"}]}]}
            }],
            "facts": [{"disjuncts": [{"predicate": {"concept": {"atomic": "A"}}, "arguments": ["a"]}]}]
        }"#;

        let kb = JsonKnowledgeBaseLoader.load_from_str(json).unwrap();
        assert_eq!(kb.clauses[0].head.atoms()[0].predicate, DLPredicate::Concept(Concept::Nothing));
        assert_eq!(kb.facts.len(), 1);
    }

    #[test]
    fn test_loader_validates() {
        let result = ClauseNotationLoader.load_from_str("A(x) -> R(x,y).");
        assert!(matches!(result, Err(ModelError::UnsafeVariable { .. })));
    }

    #[test]
    fn test_malformed_json_is_reported() {
        assert!(matches!(JsonKnowledgeBaseLoader.load_from_str("{"), Err(ModelError::Json(_))));
    }

    #[test]
    fn test_unknown_extension_is_rejected() {
        let result = load_path(Path::new("ontology.owl"));
        assert!(matches!(result, Err(ModelError::LoaderError(_))));
    }
}
