//! 入力検証
//!
//! クラウザイファ出力の整合性を推論開始前に検査します

use crate::model::{Atom, Concept, DLClause, DLPredicate, GroundAtom, KnowledgeBase};
use crate::ModelError;

impl KnowledgeBase {
    /// Reject input the tableau cannot interpret
    pub fn validate(&self) -> Result<(), ModelError> {
        for clause in &self.clauses {
            validate_clause(clause)?;
        }

        for (position, fact) in self.facts.iter().enumerate() {
            if fact.disjuncts.is_empty() {
                return Err(ModelError::EmptyFact(position));
            }
            for atom in &fact.disjuncts {
                validate_ground_atom(atom, position)?;
            }
        }

        if let Some(supplied) = self.flags {
            let computed = self.compute_flags();
            if !supplied.covers(&computed) {
                return Err(ModelError::InconsistentFlags(format!(
                    "supplied {:?}, clauses require {:?}",
                    supplied, computed
                )));
            }
        }

        Ok(())
    }
}

pub fn validate_clause(clause: &DLClause) -> Result<(), ModelError> {
    let context = || clause.to_string();

    for atom in clause.body.iter().chain(clause.head.atoms()) {
        check_arity(&atom.predicate, atom.arguments.len(), &context)?;
        if let DLPredicate::Concept(concept) = &atom.predicate {
            check_concept(concept)?;
        }
    }

    for atom in &clause.body {
        if !is_legal_body_atom(atom) {
            return Err(ModelError::IllegalBodyAtom {
                clause: context(),
                atom: atom.to_string(),
            });
        }
    }

    let bound = clause.body_variables();
    for atom in clause.head.atoms() {
        if let Some(variable) = atom.variables().find(|variable| !bound.contains(variable)) {
            return Err(ModelError::UnsafeVariable {
                clause: context(),
                variable: variable.to_string(),
            });
        }
    }

    Ok(())
}

fn validate_ground_atom(atom: &GroundAtom, position: usize) -> Result<(), ModelError> {
    check_arity(&atom.predicate, atom.arguments.len(), &|| format!("fact #{}", position))?;
    if let DLPredicate::Concept(concept) = &atom.predicate {
        check_concept(concept)?;
    }
    Ok(())
}

fn is_legal_body_atom(atom: &Atom) -> bool {
    match &atom.predicate {
        DLPredicate::Concept(Concept::Nothing) => false,
        DLPredicate::Concept(_) | DLPredicate::Role(_) => true,
        DLPredicate::Equality | DLPredicate::Inequality => false,
    }
}

fn check_arity(predicate: &DLPredicate, found: usize, context: &dyn Fn() -> String) -> Result<(), ModelError> {
    let expected = predicate.arity();
    if expected != found {
        return Err(ModelError::ArityMismatch {
            context: context(),
            predicate: predicate.to_string(),
            expected,
            found,
        });
    }
    Ok(())
}

fn check_concept(concept: &Concept) -> Result<(), ModelError> {
    if let Concept::AtLeast(at_least) = concept {
        if at_least.number == 0 || !at_least.filler.is_literal() {
            return Err(ModelError::InvalidAtLeast(concept.to_string()));
        }
    }
    Ok(())
}
