//! Análisis sintáctico y reducción a representación intermedia.
//!
//! El parser es de descenso recursivo, con una función por grupo de
//! producciones, y no construye un árbol: cada producción reducida
//! actualiza directamente el estado de compilación, agregando
//! instrucciones nombradas y registrando los nombres de los parámetros
//! declarados. El valor semántico de una expresión es el nombre (variable,
//! entrada de arreglo o temporal `tmpK`) que contiene su resultado.
//!
//! # Gramática
//!
//! ```text
//! program        := signature block
//! signature      := "void" identifier "(" parameter ("," parameter)* ")"
//! parameter      := specifiers identifier
//!                 | "double" "&" identifier
//!                 | specifiers identifier "[" integer "]"
//! specifiers     := ("const" | "double")+
//! block          := "{" statement+ "}"
//! statement      := mutable "=" immutable ";"
//!                 | specifiers identifier "=" immutable ";"
//!                 | specifiers identifier ";"
//!                 | specifiers identifier "[" integer "]" ";"
//!                 | "if" "(" boolean ")" block ("else" block)?
//! mutable        := identifier | identifier "[" integer "]"
//! immutable      := product (("+" | "-") product)*
//! product        := negation (("*" | "/") negation)*
//! negation       := "-" exponentiation | exponentiation
//! exponentiation := leaf ("^" leaf)?
//! leaf           := integer | float | "(" immutable ")" | mutable
//!                 | identifier "(" immutable ")"
//!                 | identifier "(" immutable "," immutable ")"
//! boolean        := conjunction ("||" conjunction)*
//! conjunction    := negated ("&&" comparison)*
//! negated        := "!" comparison | comparison
//! comparison     := immutable relop immutable
//! ```
//!
//! Un condicional no introduce saltos: su expresión booleana se reduce a
//! un nombre con valor `0`/`1` y toda asignación dentro del bloque se
//! emite como copia condicional guardada por ese nombre. Al consumirse el
//! token `else`, la guarda se niega en el sitio, de modo que las copias
//! de la rama falsa queden guardadas por el complemento. Los condicionales
//! anidados se rechazan.

use std::iter::Peekable;
use std::vec::IntoIter;

use crate::{
    ir::NamedInstruction,
    lex::{Keyword, Token},
    source::{Located, Location},
};
use runtime::OpCode;
use thiserror::Error;

/// Error de análisis sintáctico.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ParserError {
    #[error("Expected {0}, found {1}")]
    UnexpectedToken(&'static str, Token),

    #[error("Expected {0} before end of input")]
    UnexpectedEnd(&'static str),

    #[error("nested if/else blocks are not supported")]
    NestedIf,

    #[error("unknown unary function name `{0}`")]
    UnknownUnaryFunction(String),

    #[error("unknown binary function name `{0}`")]
    UnknownBinaryFunction(String),
}

pub type Parse<T> = Result<T, Located<ParserError>>;

/// Resultado de la reducción de una unidad de compilación completa.
#[derive(Debug)]
pub struct Lowered {
    /// Secuencia de instrucciones nombradas, en orden de ejecución.
    pub instructions: Vec<NamedInstruction>,

    /// Un nombre por slot escalar de entrada, en orden de declaración.
    pub input_names: Vec<String>,

    /// Un nombre por slot escalar de salida, en orden de declaración.
    pub output_names: Vec<String>,
}

/// Analiza una secuencia completa de tokens.
///
/// `eof` es la ubicación que se reporta cuando la entrada termina antes
/// de tiempo.
pub fn parse(tokens: Vec<Located<Token>>, eof: Location) -> Parse<Lowered> {
    Parser::new(tokens, eof).run()
}

struct Parser {
    tokens: Peekable<IntoIter<Located<Token>>>,
    eof: Location,
    instructions: Vec<NamedInstruction>,
    input_names: Vec<String>,
    output_names: Vec<String>,
    next_temporary: u32,
    condition: Option<String>,
}

impl Parser {
    fn new(tokens: Vec<Located<Token>>, eof: Location) -> Self {
        Parser {
            tokens: tokens.into_iter().peekable(),
            eof,
            instructions: Vec::new(),
            input_names: Vec::new(),
            output_names: Vec::new(),
            next_temporary: 0,
            condition: None,
        }
    }

    fn run(mut self) -> Parse<Lowered> {
        self.signature()?;
        self.block()?;

        if self.tokens.peek().is_some() {
            return self.unexpected("end of input");
        }

        Ok(Lowered {
            instructions: self.instructions,
            input_names: self.input_names,
            output_names: self.output_names,
        })
    }

    fn signature(&mut self) -> Parse<()> {
        self.expect(&Token::Keyword(Keyword::Void), "`void`")?;

        // El nombre de la función no tiene efecto semántico
        self.expect_identifier("function name")?;

        self.expect(&Token::OpenParen, "`(`")?;
        self.parameter()?;
        while matches!(self.peek(), Some(Token::Comma)) {
            self.advance();
            self.parameter()?;
        }

        self.expect(&Token::CloseParen, "`)`")?;
        Ok(())
    }

    fn parameter(&mut self) -> Parse<()> {
        use Keyword::{Const, Double};

        if !matches!(
            self.peek(),
            Some(Token::Keyword(Double)) | Some(Token::Keyword(Const))
        ) {
            return self.unexpected("parameter declaration");
        }

        let (is_const, doubles, total) = self.declaration_specifiers();

        if matches!(self.peek(), Some(Token::Reference)) {
            // La forma de salida escalar es exactamente `double &`
            if doubles != 1 || total != 1 {
                return self.unexpected("parameter name");
            }

            self.advance();
            let name = self.expect_identifier("parameter name")?;
            self.output_names.push(name.into_inner());
            return Ok(());
        }

        let name = self.expect_identifier("parameter name")?.into_inner();
        if matches!(self.peek(), Some(Token::OpenBracket)) {
            self.advance();
            let length = self.expect_integer()?;
            self.expect(&Token::CloseBracket, "`]`")?;

            // Un arreglo aporta un slot escalar por cada entrada
            let names = if is_const {
                &mut self.input_names
            } else {
                &mut self.output_names
            };

            for i in 0..length {
                names.push(format!("{}[{}]", name, i));
            }
        } else {
            self.input_names.push(name);
        }

        Ok(())
    }

    /// Consume una secuencia no vacía de `const` y `double`, reportando
    /// cuántos de cada uno se encontraron.
    fn declaration_specifiers(&mut self) -> (bool, u32, u32) {
        let mut is_const = false;
        let mut doubles = 0;
        let mut total = 0;

        loop {
            match self.peek() {
                Some(Token::Keyword(Keyword::Const)) => is_const = true,
                Some(Token::Keyword(Keyword::Double)) => doubles += 1,
                _ => break (is_const, doubles, total),
            }

            total += 1;
            self.advance();
        }
    }

    fn block(&mut self) -> Parse<()> {
        self.expect(&Token::OpenCurly, "`{`")?;

        // Un bloque contiene al menos una sentencia
        self.statement()?;
        while self.peek().is_some() && !matches!(self.peek(), Some(Token::CloseCurly)) {
            self.statement()?;
        }

        self.expect(&Token::CloseCurly, "`}`")?;
        Ok(())
    }

    fn statement(&mut self) -> Parse<()> {
        use Keyword::{Const, Double, If};

        match self.peek() {
            Some(Token::Keyword(If)) => self.conditional(),

            Some(Token::Keyword(Double)) | Some(Token::Keyword(Const)) => self.declaration(),

            Some(Token::Id(_)) => {
                let target = self.mutable()?;
                self.expect(&Token::Assign, "`=`")?;
                let value = self.immutable()?;
                self.expect(&Token::Semicolon, "`;`")?;
                self.assign(target, value);
                Ok(())
            }

            _ => self.unexpected("statement"),
        }
    }

    fn declaration(&mut self) -> Parse<()> {
        // A nivel de sentencia los especificadores son pura anotación
        self.declaration_specifiers();
        let name = self.expect_identifier("variable name")?.into_inner();

        match self.peek() {
            Some(Token::Assign) => {
                self.advance();
                let value = self.immutable()?;
                self.expect(&Token::Semicolon, "`;`")?;
                self.assign(name, value);
            }

            // Las declaraciones sin inicializador no emiten instrucciones
            Some(Token::Semicolon) => {
                self.advance();
            }

            Some(Token::OpenBracket) => {
                self.advance();
                self.expect_integer()?;
                self.expect(&Token::CloseBracket, "`]`")?;
                self.expect(&Token::Semicolon, "`;`")?;
            }

            _ => return self.unexpected("`=`, `[` or `;`"),
        }

        Ok(())
    }

    fn conditional(&mut self) -> Parse<()> {
        let if_location = match self.tokens.next() {
            Some(token) => token.split().0,
            None => unreachable!("conditional() requires an `if` lookahead"),
        };

        if self.condition.is_some() {
            return Err(Located::at(ParserError::NestedIf, if_location));
        }

        self.expect(&Token::OpenParen, "`(`")?;
        let guard = self.boolean()?;
        self.expect(&Token::CloseParen, "`)`")?;

        self.condition = Some(guard.clone());
        self.block()?;

        if matches!(self.peek(), Some(Token::Keyword(Keyword::Else))) {
            self.advance();

            // La rama falsa reutiliza la misma guarda, negada en el
            // sitio; las copias del bloque `else` quedan guardadas por
            // el complemento
            self.instructions.push(NamedInstruction::Unary {
                code: OpCode::LogicalNot,
                to: guard.clone(),
                operand: guard,
            });

            self.block()?;
        }

        self.condition = None;
        Ok(())
    }

    fn mutable(&mut self) -> Parse<String> {
        let name = self.expect_identifier("variable name")?.into_inner();

        if matches!(self.peek(), Some(Token::OpenBracket)) {
            self.advance();
            let index = self.expect_integer()?;
            self.expect(&Token::CloseBracket, "`]`")?;
            Ok(format!("{}[{}]", name, index))
        } else {
            Ok(name)
        }
    }

    fn immutable(&mut self) -> Parse<String> {
        let mut name = self.product()?;

        loop {
            let code = match self.peek() {
                Some(Token::Plus) => OpCode::Add,
                Some(Token::Minus) => OpCode::Subtract,
                _ => break Ok(name),
            };

            self.advance();
            let right = self.product()?;
            name = self.binary(code, name, right);
        }
    }

    fn product(&mut self) -> Parse<String> {
        let mut name = self.negation()?;

        loop {
            let code = match self.peek() {
                Some(Token::Times) => OpCode::Multiply,
                Some(Token::Divide) => OpCode::Divide,
                _ => break Ok(name),
            };

            self.advance();
            let right = self.negation()?;
            name = self.binary(code, name, right);
        }
    }

    fn negation(&mut self) -> Parse<String> {
        if matches!(self.peek(), Some(Token::Minus)) {
            self.advance();
            let operand = self.exponentiation()?;
            Ok(self.unary(OpCode::Negate, operand))
        } else {
            self.exponentiation()
        }
    }

    fn exponentiation(&mut self) -> Parse<String> {
        let base = self.leaf()?;

        // Deliberadamente sin recursión: el resto del mundo no se pone
        // de acuerdo en si `^` asocia a la izquierda o a la derecha, por
        // lo cual `a^b^c` se rechaza
        if matches!(self.peek(), Some(Token::Raise)) {
            self.advance();
            let exponent = self.leaf()?;
            Ok(self.binary(OpCode::Pow, base, exponent))
        } else {
            Ok(base)
        }
    }

    fn leaf(&mut self) -> Parse<String> {
        let (location, token) = match self.tokens.next() {
            Some(token) => token.split(),
            None => {
                return Err(Located::at(
                    ParserError::UnexpectedEnd("expression"),
                    self.eof.clone(),
                ))
            }
        };

        match token {
            Token::IntLiteral(value) => Ok(self.constant(value as f64)),
            Token::FloatLiteral(value) => Ok(self.constant(value)),

            Token::OpenParen => {
                let inner = self.immutable()?;
                self.expect(&Token::CloseParen, "`)`")?;
                Ok(inner)
            }

            Token::Id(name) => self.leaf_identifier(name, location),

            found => Err(Located::at(
                ParserError::UnexpectedToken("expression", found),
                location,
            )),
        }
    }

    /// Continúa una hoja que comienza con un identificador: una llamada
    /// a función integrada, una entrada de arreglo o una variable.
    fn leaf_identifier(&mut self, name: String, location: Location) -> Parse<String> {
        match self.peek() {
            Some(Token::OpenParen) => {
                self.advance();
                let first = self.immutable()?;

                if matches!(self.peek(), Some(Token::Comma)) {
                    self.advance();
                    let second = self.immutable()?;
                    self.expect(&Token::CloseParen, "`)`")?;

                    match name.as_str() {
                        "pow" => Ok(self.binary(OpCode::Pow, first, second)),
                        _ => Err(Located::at(
                            ParserError::UnknownBinaryFunction(name),
                            location,
                        )),
                    }
                } else {
                    self.expect(&Token::CloseParen, "`)`")?;

                    let code = match name.as_str() {
                        "sqrt" => OpCode::Sqrt,
                        "sin" => OpCode::Sin,
                        "cos" => OpCode::Cos,
                        "exp" => OpCode::Exp,
                        _ => {
                            return Err(Located::at(
                                ParserError::UnknownUnaryFunction(name),
                                location,
                            ))
                        }
                    };

                    Ok(self.unary(code, first))
                }
            }

            Some(Token::OpenBracket) => {
                self.advance();
                let index = self.expect_integer()?;
                self.expect(&Token::CloseBracket, "`]`")?;
                Ok(format!("{}[{}]", name, index))
            }

            _ => Ok(name),
        }
    }

    fn boolean(&mut self) -> Parse<String> {
        let mut name = self.conjunction()?;

        while matches!(self.peek(), Some(Token::Or)) {
            self.advance();
            let right = self.conjunction()?;
            name = self.binary(OpCode::LogicalOr, name, right);
        }

        Ok(name)
    }

    fn conjunction(&mut self) -> Parse<String> {
        let mut name = self.negated_comparison()?;

        while matches!(self.peek(), Some(Token::And)) {
            self.advance();

            // El operando derecho de `&&` es directamente una comparación
            let right = self.comparison()?;
            name = self.binary(OpCode::LogicalAnd, name, right);
        }

        Ok(name)
    }

    fn negated_comparison(&mut self) -> Parse<String> {
        if matches!(self.peek(), Some(Token::Not)) {
            self.advance();
            let operand = self.comparison()?;
            Ok(self.unary(OpCode::LogicalNot, operand))
        } else {
            self.comparison()
        }
    }

    fn comparison(&mut self) -> Parse<String> {
        let left = self.immutable()?;

        let code = match self.peek() {
            Some(Token::Equal) => OpCode::Equal,
            Some(Token::NotEqual) => OpCode::NotEqual,
            Some(Token::Less) => OpCode::Less,
            Some(Token::LessOrEqual) => OpCode::LessOrEqual,
            Some(Token::Greater) => OpCode::Greater,
            Some(Token::GreaterOrEqual) => OpCode::GreaterOrEqual,
            _ => return self.unexpected("comparison operator"),
        };

        self.advance();
        let right = self.immutable()?;
        Ok(self.binary(code, left, right))
    }

    /// Emite la asignación de `source` a `destination`, guardada por la
    /// condición activa si la hay.
    fn assign(&mut self, destination: String, source: String) {
        let instruction = match &self.condition {
            Some(condition) => NamedInstruction::ConditionalCopy {
                to: destination,
                condition: condition.clone(),
                value: source,
            },

            None => NamedInstruction::Copy {
                to: destination,
                from: source,
            },
        };

        self.instructions.push(instruction);
    }

    fn temporary(&mut self) -> String {
        self.next_temporary += 1;
        format!("tmp{}", self.next_temporary)
    }

    fn constant(&mut self, value: f64) -> String {
        let to = self.temporary();
        self.instructions.push(NamedInstruction::Constant {
            to: to.clone(),
            value,
        });

        to
    }

    fn unary(&mut self, code: OpCode, operand: String) -> String {
        let to = self.temporary();
        self.instructions.push(NamedInstruction::Unary {
            code,
            to: to.clone(),
            operand,
        });

        to
    }

    fn binary(&mut self, code: OpCode, left: String, right: String) -> String {
        let to = self.temporary();
        self.instructions.push(NamedInstruction::Binary {
            code,
            to: to.clone(),
            left,
            right,
        });

        to
    }

    fn peek(&mut self) -> Option<&Token> {
        self.tokens.peek().map(|token| token.val())
    }

    fn advance(&mut self) -> Option<Located<Token>> {
        self.tokens.next()
    }

    fn expect(&mut self, expected: &Token, what: &'static str) -> Parse<Location> {
        match self.tokens.next() {
            Some(token) if token.val() == expected => Ok(token.split().0),

            Some(token) => {
                let (location, found) = token.split();
                Err(Located::at(
                    ParserError::UnexpectedToken(what, found),
                    location,
                ))
            }

            None => Err(Located::at(
                ParserError::UnexpectedEnd(what),
                self.eof.clone(),
            )),
        }
    }

    fn expect_identifier(&mut self, what: &'static str) -> Parse<Located<String>> {
        match self.tokens.next() {
            Some(token) => {
                let (location, token) = token.split();
                match token {
                    Token::Id(name) => Ok(Located::at(name, location)),
                    found => Err(Located::at(
                        ParserError::UnexpectedToken(what, found),
                        location,
                    )),
                }
            }

            None => Err(Located::at(
                ParserError::UnexpectedEnd(what),
                self.eof.clone(),
            )),
        }
    }

    fn expect_integer(&mut self) -> Parse<i32> {
        match self.tokens.next() {
            Some(token) => {
                let (location, token) = token.split();
                match token {
                    Token::IntLiteral(value) => Ok(value),
                    found => Err(Located::at(
                        ParserError::UnexpectedToken("integer literal", found),
                        location,
                    )),
                }
            }

            None => Err(Located::at(
                ParserError::UnexpectedEnd("integer literal"),
                self.eof.clone(),
            )),
        }
    }

    /// Falla consumiendo el siguiente token, el cual no corresponde a
    /// ninguna producción aplicable.
    fn unexpected<T>(&mut self, what: &'static str) -> Parse<T> {
        match self.tokens.next() {
            Some(token) => {
                let (location, found) = token.split();
                Err(Located::at(
                    ParserError::UnexpectedToken(what, found),
                    location,
                ))
            }

            None => Err(Located::at(
                ParserError::UnexpectedEnd(what),
                self.eof.clone(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lex::Lexer;
    use crate::source::Source;

    fn lower(text: &str) -> Parse<Lowered> {
        let source = Source::new("test", text);
        let tokens = Lexer::new(&source, text).tokenize().expect("lexing failed");
        let eof = tokens
            .last()
            .map(|token| token.location().clone())
            .unwrap_or_else(|| Location::start_of(&source));

        parse(tokens, eof)
    }

    #[test]
    fn lowers_assignment_to_three_address_form() {
        let lowered = lower("void f(double x, double& r) { r = x + 1; }").unwrap();

        assert_eq!(lowered.input_names, vec!["x"]);
        assert_eq!(lowered.output_names, vec!["r"]);
        assert_eq!(
            lowered.instructions,
            vec![
                NamedInstruction::Constant {
                    to: "tmp1".into(),
                    value: 1.0,
                },
                NamedInstruction::Binary {
                    code: OpCode::Add,
                    to: "tmp2".into(),
                    left: "x".into(),
                    right: "tmp1".into(),
                },
                NamedInstruction::Copy {
                    to: "r".into(),
                    from: "tmp2".into(),
                },
            ]
        );
    }

    #[test]
    fn array_parameters_become_scalar_slots() {
        let lowered = lower(
            "void f(const double in[2], double out[3]) { out[0] = in[1]; out[1] = in[0]; out[2] = in[0]; }",
        )
        .unwrap();

        assert_eq!(lowered.input_names, vec!["in[0]", "in[1]"]);
        assert_eq!(lowered.output_names, vec!["out[0]", "out[1]", "out[2]"]);
    }

    #[test]
    fn conditional_lowers_to_guarded_copies() {
        let lowered = lower(
            "void f(double a, double b, double& r) { r = a; if (a < b) { r = b; } else { r = a; } }",
        )
        .unwrap();

        assert_eq!(
            lowered.instructions,
            vec![
                NamedInstruction::Copy {
                    to: "r".into(),
                    from: "a".into(),
                },
                NamedInstruction::Binary {
                    code: OpCode::Less,
                    to: "tmp1".into(),
                    left: "a".into(),
                    right: "b".into(),
                },
                NamedInstruction::ConditionalCopy {
                    to: "r".into(),
                    condition: "tmp1".into(),
                    value: "b".into(),
                },
                // Al consumir `else` la guarda se niega en el sitio
                NamedInstruction::Unary {
                    code: OpCode::LogicalNot,
                    to: "tmp1".into(),
                    operand: "tmp1".into(),
                },
                NamedInstruction::ConditionalCopy {
                    to: "r".into(),
                    condition: "tmp1".into(),
                    value: "a".into(),
                },
            ]
        );
    }

    #[test]
    fn nested_conditionals_are_rejected() {
        let error = lower(
            "void f(double a, double b, double& r) { if (a < b) { if (a > 0) { r = a; } } }",
        )
        .unwrap_err();

        assert!(matches!(error.val(), ParserError::NestedIf));
    }

    #[test]
    fn unknown_functions_are_rejected() {
        let error = lower("void f(double x, double& r) { r = foo(x); }").unwrap_err();
        assert!(matches!(
            error.val(),
            ParserError::UnknownUnaryFunction(name) if name == "foo"
        ));

        let error = lower("void f(double x, double& r) { r = atan2(x, x); }").unwrap_err();
        assert!(matches!(
            error.val(),
            ParserError::UnknownBinaryFunction(name) if name == "atan2"
        ));
    }

    #[test]
    fn exponentiation_does_not_associate() {
        assert!(lower("void f(double x, double& r) { r = x^2; }").is_ok());
        assert!(lower("void f(double x, double& r) { r = x^2^3; }").is_err());
    }

    #[test]
    fn booleans_require_a_comparison() {
        let error = lower("void f(double x, double& r) { if (x) { r = x; } }").unwrap_err();
        assert!(matches!(
            error.val(),
            ParserError::UnexpectedToken("comparison operator", _)
        ));
    }

    #[test]
    fn parameter_forms() {
        // `const double &` no es una forma válida de parámetro
        assert!(lower("void f(const double& x, double& r) { r = x; }").is_err());

        // Se requiere al menos un parámetro
        assert!(lower("void f() { double t; }").is_err());

        // Un escalar no-const sigue siendo una entrada
        assert!(lower("void f(double x, double& r) { r = x; }").is_ok());
    }

    #[test]
    fn negation_and_precedence() {
        let lowered = lower("void f(double x, double& r) { r = -x * x; }").unwrap();

        // `-x * x` es `(-x) * x`: la negación se emite primero
        assert_eq!(
            lowered.instructions,
            vec![
                NamedInstruction::Unary {
                    code: OpCode::Negate,
                    to: "tmp1".into(),
                    operand: "x".into(),
                },
                NamedInstruction::Binary {
                    code: OpCode::Multiply,
                    to: "tmp2".into(),
                    left: "tmp1".into(),
                    right: "x".into(),
                },
                NamedInstruction::Copy {
                    to: "r".into(),
                    from: "tmp2".into(),
                },
            ]
        );
    }
}
