//! 節記法パーサー
//!
//! `Display` 出力と同じ記法で節と基底事実を読み込みます:
//!
//! ```text
//! # comment
//! A(x), R(x,y) -> B(y) | C(y).
//! A(x) -> B(x), >=2 R.C(x).
//! A(x), !A(x) -> false.
//! A('a') | B('a').
//! ```

use crate::model::{
    Atom, ClauseHead, Concept, DLClause, DLPredicate, GroundAtom, GroundFact, Individual, KnowledgeBase, Role, Term,
};
use crate::ModelError;
use logos::Logos;

/// 記法トークン
#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"([ \t\r\n\f]+|#[^\n]*)")]
enum Token<'a> {
    #[token("->")]
    Arrow,

    #[token("==")]
    Equals,

    #[token("!=")]
    NotEquals,

    #[token(">=")]
    AtLeast,

    #[token("!")]
    Not,

    #[token("-")]
    Minus,

    #[token("(")]
    LParen,

    #[token(")")]
    RParen,

    #[token(",")]
    Comma,

    #[token("|")]
    Pipe,

    #[token(".")]
    Dot,

    #[token("false")]
    False,

    #[regex(r"[0-9]+", |lex| lex.slice().parse::<u32>().ok())]
    Number(u32),

    #[regex(r"[A-Za-z_][A-Za-z0-9_]*")]
    Ident(&'a str),

    #[regex(r"'[^']*'", |lex| { let s = lex.slice(); &s[1..s.len() - 1] })]
    Quoted(&'a str),
}

/// One parsed statement
enum Statement {
    Clause(DLClause),
    Fact(GroundFact),
}

struct Parser<'a> {
    tokens: Vec<(Token<'a>, usize)>,
    position: usize,
    end: usize,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Result<Self, ModelError> {
        let mut lexer = Token::lexer(input);
        let mut tokens = Vec::new();

        while let Some(result) = lexer.next() {
            match result {
                Ok(token) => tokens.push((token, lexer.span().start)),
                Err(()) => {
                    return Err(ModelError::Syntax {
                        offset: lexer.span().start,
                        message: format!("unexpected input '{}'", lexer.slice()),
                    })
                }
            }
        }

        Ok(Self {
            tokens,
            position: 0,
            end: input.len(),
        })
    }

    fn peek(&self) -> Option<&Token<'a>> {
        self.tokens.get(self.position).map(|(token, _)| token)
    }

    fn peek_at(&self, offset: usize) -> Option<&Token<'a>> {
        self.tokens.get(self.position + offset).map(|(token, _)| token)
    }

    fn offset(&self) -> usize {
        self.tokens.get(self.position).map(|(_, offset)| *offset).unwrap_or(self.end)
    }

    fn is_eof(&self) -> bool {
        self.position >= self.tokens.len()
    }

    fn advance(&mut self) -> Option<Token<'a>> {
        let token = self.tokens.get(self.position).map(|(token, _)| token.clone());
        if token.is_some() {
            self.position += 1;
        }
        token
    }

    fn eat(&mut self, expected: &Token<'a>) -> bool {
        if self.peek() == Some(expected) {
            self.position += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, expected: Token<'a>, what: &str) -> Result<(), ModelError> {
        if self.eat(&expected) {
            Ok(())
        } else {
            Err(self.error(format!("expected {}", what)))
        }
    }

    fn error(&self, message: String) -> ModelError {
        let found = match self.peek() {
            Some(token) => format!("{:?}", token),
            None => "end of input".to_string(),
        };
        ModelError::Syntax {
            offset: self.offset(),
            message: format!("{}, found {}", message, found),
        }
    }

    fn statement(&mut self) -> Result<Statement, ModelError> {
        if self.eat(&Token::Arrow) {
            let head = self.head()?;
            return Ok(Statement::Clause(DLClause::new(Vec::new(), head)));
        }

        let start = self.offset();
        let first = self.atom()?;

        match self.peek() {
            Some(Token::Arrow) | Some(Token::Comma) => {
                let mut body = vec![first];
                while self.eat(&Token::Comma) {
                    body.push(self.atom()?);
                }
                self.expect(Token::Arrow, "'->'")?;
                let head = self.head()?;
                Ok(Statement::Clause(DLClause::new(body, head)))
            }
            _ => {
                let mut disjuncts = vec![first];
                while self.eat(&Token::Pipe) {
                    disjuncts.push(self.atom()?);
                }
                let disjuncts = disjuncts
                    .into_iter()
                    .map(|atom| ground(atom, start))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Statement::Fact(GroundFact::disjunction(disjuncts)))
            }
        }
    }

    fn head(&mut self) -> Result<ClauseHead, ModelError> {
        if self.eat(&Token::False) {
            return Ok(ClauseHead::Conjunction(Vec::new()));
        }

        let first = self.atom()?;
        match self.peek() {
            Some(Token::Pipe) => {
                let mut atoms = vec![first];
                while self.eat(&Token::Pipe) {
                    atoms.push(self.atom()?);
                }
                Ok(ClauseHead::Disjunction(atoms))
            }
            _ => {
                let mut atoms = vec![first];
                while self.eat(&Token::Comma) {
                    atoms.push(self.atom()?);
                }
                Ok(ClauseHead::Conjunction(atoms))
            }
        }
    }

    fn atom(&mut self) -> Result<Atom, ModelError> {
        match self.peek().cloned() {
            Some(Token::Not) | Some(Token::AtLeast) => {
                let concept = self.concept()?;
                let mut arguments = self.arguments()?;
                if arguments.len() != 1 {
                    return Err(self.error(format!("concept {} takes one argument", concept)));
                }
                Ok(Atom::concept(concept, arguments.remove(0)))
            }
            Some(Token::Ident(_)) if matches!(self.peek_at(1), Some(Token::Equals) | Some(Token::NotEquals)) => {
                self.equality()
            }
            Some(Token::Quoted(_)) => self.equality(),
            Some(Token::Ident(name)) => {
                self.position += 1;
                let inverse = self.eat(&Token::Minus);
                let mut arguments = self.arguments()?;

                match (arguments.len(), inverse) {
                    (1, false) => Ok(Atom::concept(named_concept(name), arguments.remove(0))),
                    (2, false) => Ok(Atom::new(DLPredicate::Role(Role::atomic(name)), arguments)),
                    (2, true) => Ok(Atom::new(DLPredicate::Role(Role::inverse(name)), arguments)),
                    _ => Err(self.error(format!("predicate {} applied to {} argument(s)", name, arguments.len()))),
                }
            }
            _ => Err(self.error("expected atom".to_string())),
        }
    }

    fn equality(&mut self) -> Result<Atom, ModelError> {
        let left = self.term()?;
        let predicate = if self.eat(&Token::Equals) {
            DLPredicate::Equality
        } else if self.eat(&Token::NotEquals) {
            DLPredicate::Inequality
        } else {
            return Err(self.error("expected '==' or '!='".to_string()));
        };
        let right = self.term()?;
        Ok(Atom::new(predicate, vec![left, right]))
    }

    fn concept(&mut self) -> Result<Concept, ModelError> {
        match self.advance() {
            Some(Token::Not) => match self.advance() {
                Some(Token::Ident(name)) => Ok(Concept::negated(name)),
                _ => Err(self.error("expected concept name after '!'".to_string())),
            },
            Some(Token::AtLeast) => {
                let number = match self.advance() {
                    Some(Token::Number(number)) => number,
                    _ => return Err(self.error("expected number after '>='".to_string())),
                };
                let role = self.role()?;
                self.expect(Token::Dot, "'.' between role and filler")?;
                let filler = self.concept()?;
                Ok(Concept::at_least(number, role, filler))
            }
            Some(Token::Ident(name)) => Ok(named_concept(name)),
            _ => Err(self.error("expected concept".to_string())),
        }
    }

    fn role(&mut self) -> Result<Role, ModelError> {
        match self.advance() {
            Some(Token::Ident(name)) => {
                if self.eat(&Token::Minus) {
                    Ok(Role::inverse(name))
                } else {
                    Ok(Role::atomic(name))
                }
            }
            _ => Err(self.error("expected role name".to_string())),
        }
    }

    fn arguments(&mut self) -> Result<Vec<Term>, ModelError> {
        self.expect(Token::LParen, "'('")?;
        let mut arguments = vec![self.term()?];
        while self.eat(&Token::Comma) {
            arguments.push(self.term()?);
        }
        self.expect(Token::RParen, "')'")?;
        Ok(arguments)
    }

    fn term(&mut self) -> Result<Term, ModelError> {
        let term = match self.peek() {
            Some(Token::Ident(name)) => Term::variable(*name),
            Some(Token::Quoted(name)) => Term::individual(*name),
            _ => return Err(self.error("expected variable or 'individual'".to_string())),
        };
        self.position += 1;
        Ok(term)
    }
}

fn named_concept(name: &str) -> Concept {
    match name {
        "Thing" => Concept::Thing,
        "Nothing" => Concept::Nothing,
        _ => Concept::atomic(name),
    }
}

fn ground(atom: Atom, offset: usize) -> Result<GroundAtom, ModelError> {
    let arguments = atom
        .arguments
        .into_iter()
        .map(|term| match term {
            Term::Individual(individual) => Ok(individual),
            Term::Variable(name) => Err(ModelError::Syntax {
                offset,
                message: format!("variable {} in ground fact", name),
            }),
        })
        .collect::<Result<Vec<Individual>, _>>()?;
    Ok(GroundAtom::new(atom.predicate, arguments))
}

/// Parse a sequence of `.`-terminated clauses and facts
pub fn parse_knowledge_base(input: &str) -> Result<KnowledgeBase, ModelError> {
    let mut parser = Parser::new(input)?;
    let mut knowledge_base = KnowledgeBase::default();

    while !parser.is_eof() {
        match parser.statement()? {
            Statement::Clause(clause) => knowledge_base.add_clause(clause),
            Statement::Fact(fact) => knowledge_base.add_fact(fact),
        }
        parser.expect(Token::Dot, "'.' at end of statement")?;
    }

    Ok(knowledge_base)
}

/// Parse a single clause; the trailing `.` is optional
pub fn parse_clause(input: &str) -> Result<DLClause, ModelError> {
    let mut parser = Parser::new(input)?;
    let offset = parser.offset();
    match single_statement(&mut parser)? {
        Statement::Clause(clause) => Ok(clause),
        Statement::Fact(_) => Err(ModelError::Syntax {
            offset,
            message: "expected clause, found ground fact".to_string(),
        }),
    }
}

/// Parse a single ground fact; the trailing `.` is optional
pub fn parse_fact(input: &str) -> Result<GroundFact, ModelError> {
    let mut parser = Parser::new(input)?;
    let offset = parser.offset();
    match single_statement(&mut parser)? {
        Statement::Fact(fact) => Ok(fact),
        Statement::Clause(_) => Err(ModelError::Syntax {
            offset,
            message: "expected ground fact, found clause".to_string(),
        }),
    }
}

fn single_statement(parser: &mut Parser<'_>) -> Result<Statement, ModelError> {
    let statement = parser.statement()?;
    parser.eat(&Token::Dot);
    if !parser.is_eof() {
        return Err(parser.error("trailing input".to_string()));
    }
    Ok(statement)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_disjunctive_clause() {
        let clause = parse_clause("A(x), R(x,y) -> B(y) | C(y).").unwrap();

        assert_eq!(clause.body.len(), 2);
        assert_eq!(clause.body[1].predicate, DLPredicate::Role(Role::atomic("R")));
        assert!(clause.head.is_disjunctive());
        assert_eq!(clause.head.atoms().len(), 2);
    }

    #[test]
    fn test_parse_existential_head() {
        let clause = parse_clause("A(x) -> B(x), >=2 R-.!C(x)").unwrap();

        assert!(!clause.head.is_disjunctive());
        assert_eq!(
            clause.head.atoms()[1].predicate,
            DLPredicate::Concept(Concept::at_least(2, Role::inverse("R"), Concept::negated("C")))
        );
    }

    #[test]
    fn test_parse_equality_and_empty_head() {
        let clause = parse_clause("R(x,y1), R(x,y2) -> y1 == y2").unwrap();
        assert_eq!(clause.head.atoms()[0].predicate, DLPredicate::Equality);

        let contradiction = parse_clause("A(x), !A(x) -> false").unwrap();
        assert!(contradiction.head.is_empty());
    }

    #[test]
    fn test_parse_ground_disjunction() {
        let fact = parse_fact("P('a') | Q('a')").unwrap();

        assert_eq!(fact.disjuncts.len(), 2);
        assert_eq!(fact.disjuncts[0].arguments, vec![Individual::new("a")]);
    }

    #[test]
    fn test_fact_with_variable_is_rejected() {
        assert!(matches!(parse_fact("P(x)"), Err(ModelError::Syntax { .. })));
    }

    #[test]
    fn test_display_is_parseable() {
        let source = "Thing(x), R-(x,y), !B(y) -> >=1 S.Thing(y) | x == y | 'o' != y";
        let clause = parse_clause(source).unwrap();

        assert_eq!(parse_clause(&clause.to_string()).unwrap(), clause);
    }

    #[test]
    fn test_parse_document_with_comments() {
        let kb = parse_knowledge_base(
            "# terminology\n\
             C(x) -> >=1 R.C(x).\n\
             # assertions\n\
             C('root').\n\
             R('root','other').\n",
        )
        .unwrap();

        assert_eq!(kb.clauses.len(), 1);
        assert_eq!(kb.facts.len(), 2);
        assert_eq!(kb.individuals(), vec![Individual::new("root"), Individual::new("other")]);
    }

    #[test]
    fn test_syntax_error_reports_offset() {
        match parse_knowledge_base("A(x) -> B(x)\nC(x) -> D(x).") {
            Err(ModelError::Syntax { offset, .. }) => assert_eq!(offset, 13),
            other => panic!("expected syntax error, got {:?}", other),
        }
    }
}
