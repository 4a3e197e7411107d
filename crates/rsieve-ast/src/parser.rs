//! Recursive-descent parser for the RFC 5228 grammar.
//!
//! The parser is grammar-only: it accepts any well-formed command with any
//! argument mix and leaves command-specific checking to the validator.
//! On error it reports a diagnostic and resynchronises at the next
//! statement boundary, so one run can surface several problems.

use crate::ast::{ArgValue, Argument, Ast, Node, NodeId, NodeKind};
use crate::diag::{Diagnostics, Location};
use crate::lexer::{Lexer, Token};

pub struct Parser<'a> {
    lexer: Lexer<'a>,
    current: Token,
    current_loc: Location,
    ast: Ast,
    failed: bool,
}

impl<'a> Parser<'a> {
    pub fn new(input: &'a str, diags: &mut Diagnostics) -> Self {
        let mut lexer = Lexer::new(input);
        let (current, current_loc) = match lexer.next_token() {
            Ok(pair) => pair,
            Err(err) => {
                diags.error(Some(err.location), err.message.clone());
                (Token::Eof, err.location)
            }
        };
        Self {
            lexer,
            current,
            current_loc,
            ast: Ast::new(),
            failed: false,
        }
    }

    /// Parse the whole script. Returns the AST only when no errors were
    /// reported.
    pub fn run(mut self, diags: &mut Diagnostics) -> Option<Ast> {
        while self.current != Token::Eof {
            match self.parse_command(None, diags) {
                Some(id) => self.ast.push_root(id),
                None => {
                    // A stray '}' at top level would otherwise stall
                    // recovery, which only stops at block boundaries.
                    if self.current == Token::RightBrace {
                        self.advance(diags);
                    }
                    self.recover(diags);
                }
            }
        }
        if diags.has_errors() || self.failed {
            None
        } else {
            Some(self.ast)
        }
    }

    fn advance(&mut self, diags: &mut Diagnostics) {
        match self.lexer.next_token() {
            Ok((tok, loc)) => {
                self.current = tok;
                self.current_loc = loc;
            }
            Err(err) => {
                // Lexical errors are fatal; pretend the script ended.
                diags.error(Some(err.location), err.message.clone());
                self.current = Token::Eof;
                self.current_loc = err.location;
                self.failed = true;
            }
        }
    }

    /// Skip to the next statement boundary after an error.
    fn recover(&mut self, diags: &mut Diagnostics) {
        loop {
            match &self.current {
                Token::Eof => return,
                Token::Semicolon => {
                    self.advance(diags);
                    return;
                }
                Token::LeftBrace => {
                    // Skip a whole block.
                    let mut depth = 0usize;
                    loop {
                        match &self.current {
                            Token::Eof => return,
                            Token::LeftBrace => depth += 1,
                            Token::RightBrace => {
                                depth -= 1;
                                if depth == 0 {
                                    self.advance(diags);
                                    return;
                                }
                            }
                            _ => {}
                        }
                        self.advance(diags);
                    }
                }
                Token::RightBrace => return,
                _ => self.advance(diags),
            }
        }
    }

    fn parse_command(
        &mut self,
        parent: Option<NodeId>,
        diags: &mut Diagnostics,
    ) -> Option<NodeId> {
        let location = self.current_loc;
        let Token::Identifier(name) = self.current.clone() else {
            diags.error(
                Some(location),
                format!("expected a command, found {}", self.current.describe()),
            );
            return None;
        };
        self.advance(diags);

        let id = self.ast.push(Node {
            kind: NodeKind::Command,
            // Identifiers are case-insensitive (RFC 5228 §2.7.2); normalise
            // at parse so later passes can compare directly.
            name: name.to_ascii_lowercase(),
            args: Vec::new(),
            tests: Vec::new(),
            block: Vec::new(),
            has_block: false,
            parent,
            location,
        });

        self.parse_arguments(id, diags)?;

        // A command ends with either a block or a semicolon.
        match &self.current {
            Token::LeftBrace => {
                self.advance(diags);
                self.ast.node_mut(id).has_block = true;
                while self.current != Token::RightBrace {
                    if self.current == Token::Eof {
                        diags.error(Some(self.current_loc), "unexpected end of script in block");
                        return None;
                    }
                    match self.parse_command(Some(id), diags) {
                        Some(child) => self.ast.node_mut(id).block.push(child),
                        None => self.recover(diags),
                    }
                }
                self.advance(diags);
            }
            Token::Semicolon => {
                self.advance(diags);
            }
            other => {
                diags.error(
                    Some(self.current_loc),
                    format!("expected ';' or a block, found {}", other.describe()),
                );
                return None;
            }
        }

        Some(id)
    }

    /// Arguments: literals and tags, then optionally one test or a
    /// parenthesised test list.
    fn parse_arguments(&mut self, node: NodeId, diags: &mut Diagnostics) -> Option<()> {
        loop {
            let location = self.current_loc;
            let value = match self.current.clone() {
                Token::Str(s) => {
                    self.advance(diags);
                    ArgValue::Str(s)
                }
                Token::Number(n) => {
                    self.advance(diags);
                    ArgValue::Number(n)
                }
                Token::Tag(name) => {
                    self.advance(diags);
                    ArgValue::Tag(name.to_ascii_lowercase())
                }
                Token::LeftBracket => ArgValue::StringList(self.parse_string_list(diags)?),
                _ => break,
            };
            self.ast.node_mut(node).args.push(Argument { value, location });
        }

        match &self.current {
            Token::Identifier(_) => {
                let test = self.parse_test(node, diags)?;
                self.ast.node_mut(node).tests.push(test);
            }
            Token::LeftParen => {
                self.advance(diags);
                loop {
                    let test = self.parse_test(node, diags)?;
                    self.ast.node_mut(node).tests.push(test);
                    match &self.current {
                        Token::Comma => self.advance(diags),
                        Token::RightParen => {
                            self.advance(diags);
                            break;
                        }
                        other => {
                            diags.error(
                                Some(self.current_loc),
                                format!(
                                    "expected ',' or ')' in test list, found {}",
                                    other.describe()
                                ),
                            );
                            return None;
                        }
                    }
                }
            }
            _ => {}
        }

        Some(())
    }

    fn parse_test(&mut self, parent: NodeId, diags: &mut Diagnostics) -> Option<NodeId> {
        let location = self.current_loc;
        let Token::Identifier(name) = self.current.clone() else {
            diags.error(
                Some(location),
                format!("expected a test, found {}", self.current.describe()),
            );
            return None;
        };
        self.advance(diags);

        let id = self.ast.push(Node {
            kind: NodeKind::Test,
            name: name.to_ascii_lowercase(),
            args: Vec::new(),
            tests: Vec::new(),
            block: Vec::new(),
            has_block: false,
            parent: Some(parent),
            location,
        });
        self.parse_arguments(id, diags)?;
        Some(id)
    }

    fn parse_string_list(&mut self, diags: &mut Diagnostics) -> Option<Vec<String>> {
        self.advance(diags); // '['
        let mut items = Vec::new();
        if self.current == Token::RightBracket {
            diags.error(Some(self.current_loc), "string list must not be empty");
            return None;
        }
        loop {
            match self.current.clone() {
                Token::Str(s) => {
                    self.advance(diags);
                    items.push(s);
                }
                other => {
                    diags.error(
                        Some(self.current_loc),
                        format!("expected a string in list, found {}", other.describe()),
                    );
                    return None;
                }
            }
            match &self.current {
                Token::Comma => self.advance(diags),
                Token::RightBracket => {
                    self.advance(diags);
                    return Some(items);
                }
                other => {
                    diags.error(
                        Some(self.current_loc),
                        format!("expected ',' or ']' in list, found {}", other.describe()),
                    );
                    return None;
                }
            }
        }
    }
}

/// Parse a script source into an AST.
pub fn parse(input: &str, diags: &mut Diagnostics) -> Option<Ast> {
    Parser::new(input, diags).run(diags)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::NodeKind;

    fn parse_ok(input: &str) -> Ast {
        let mut diags = Diagnostics::new();
        let ast = parse(input, &mut diags);
        assert!(!diags.has_errors(), "diagnostics: {:?}", diags.entries());
        ast.unwrap()
    }

    #[test]
    fn test_simple_command() {
        let ast = parse_ok("keep;");
        assert_eq!(ast.roots().len(), 1);
        let node = ast.node(ast.roots()[0]);
        assert_eq!(node.name, "keep");
        assert_eq!(node.kind, NodeKind::Command);
        assert!(!node.has_block);
    }

    #[test]
    fn test_if_with_test_and_block() {
        let ast = parse_ok("if header :contains \"subject\" \"x\" { discard; }");
        let cmd = ast.node(ast.roots()[0]);
        assert_eq!(cmd.name, "if");
        assert!(cmd.has_block);
        assert_eq!(cmd.tests.len(), 1);
        assert_eq!(cmd.block.len(), 1);
        let test = ast.node(cmd.tests[0]);
        assert_eq!(test.kind, NodeKind::Test);
        assert_eq!(test.name, "header");
        assert_eq!(test.args.len(), 3);
        assert_eq!(test.args[0].value, ArgValue::Tag("contains".into()));
    }

    #[test]
    fn test_nested_test_list() {
        let ast = parse_ok("if anyof (true, not false, allof (true, true)) { stop; }");
        let cmd = ast.node(ast.roots()[0]);
        let anyof = ast.node(cmd.tests[0]);
        assert_eq!(anyof.name, "anyof");
        assert_eq!(anyof.tests.len(), 3);
        let not = ast.node(anyof.tests[1]);
        assert_eq!(not.name, "not");
        assert_eq!(not.tests.len(), 1);
        let allof = ast.node(anyof.tests[2]);
        assert_eq!(allof.tests.len(), 2);
    }

    #[test]
    fn test_string_list_argument() {
        let ast = parse_ok("require [\"fileinto\", \"copy\"];");
        let node = ast.node(ast.roots()[0]);
        assert_eq!(
            node.args[0].value,
            ArgValue::StringList(vec!["fileinto".into(), "copy".into()])
        );
    }

    #[test]
    fn test_error_recovery_collects_multiple() {
        let mut diags = Diagnostics::new();
        let ast = parse("require [; stop; ];", &mut diags);
        assert!(ast.is_none());
        assert!(diags.error_count() >= 2, "got {}", diags.error_count());
    }

    #[test]
    fn test_missing_semicolon() {
        let mut diags = Diagnostics::new();
        assert!(parse("keep", &mut diags).is_none());
        assert!(diags.has_errors());
    }

    #[test]
    fn test_empty_list_rejected() {
        let mut diags = Diagnostics::new();
        assert!(parse("require [];", &mut diags).is_none());
    }

    #[test]
    fn test_stray_brace_recovers() {
        let mut diags = Diagnostics::new();
        assert!(parse("} keep;", &mut diags).is_none());
        assert!(diags.has_errors());
    }

    #[test]
    fn test_elsif_chain_parses() {
        let ast = parse_ok(
            "if true { keep; } elsif false { discard; } else { stop; }",
        );
        assert_eq!(ast.roots().len(), 3);
        assert_eq!(ast.node(ast.roots()[1]).name, "elsif");
        assert_eq!(ast.node(ast.roots()[2]).name, "else");
    }
}
