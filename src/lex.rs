//! Análisis léxico.
//!
//! # Tokenization
//! Esta es la primera fase del compilador. Descompone el texto fuente en
//! unidades léxicas denominadas tokens. Los espacios en blanco y los
//! comentarios de bloque `/* ... */` se descartan durante esta operación;
//! pueden aparecer entre cualesquiera dos tokens. No existen comentarios
//! de línea. Cada token emitido queda asociado a una ubicación en el
//! código fuente original, lo cual permite rastrear errores tanto en los
//! tokens mismos como en constructos más elevados de fases posteriores.
//!
//! # Contenido de un token
//! Operadores, puntuación y palabras clave se identifican por el hecho de
//! lo que son y no incluyen lexemas. Los identificadores sí incluyen su
//! lexema original. Las constantes literales se resuelven a sus valores en
//! vez de preservar sus lexemas.
//!
//! # Reglas importantes del lenguaje
//! - Los identificadores siguen la forma `[_A-Za-z][_A-Za-z0-9]*` y son
//!   sensibles a mayúsculas.
//! - Un literal entero es `0` o `[1-9][0-9]*`: sin ceros a la izquierda y
//!   dentro del rango de un entero de 32 bits con signo.
//! - Un literal de punto flotante es un literal entero seguido de una
//!   parte fraccionaria `.[0-9]*` opcional y un exponente `[eE][+-]?[0-9]+`
//!   opcional. Una `e` que no encabeza un exponente válido no forma parte
//!   del número: `2e` son dos tokens.
//! - `&&`, `||`, `==`, `!=`, `<=` y `>=` se prefieren sobre sus prefijos
//!   de un carácter. Un `|` suelto no es un token válido.

use crate::source::{Located, Location, Position, Source};
use std::{
    fmt::{self, Display},
    iter::Peekable,
    mem,
    rc::Rc,
    str::{Chars, FromStr},
};

use thiserror::Error;

/// Error de escaneo.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum LexerError {
    /// Carácter desconocido o inesperado en el flujo de entrada.
    #[error("Bad character {0:?} in input stream")]
    BadChar(char),

    /// Se esperaba un carácter específico en esta posición.
    #[error("Expected {0:?}")]
    Expected(char),

    /// Una constante entera se encuentra fuera de rango.
    #[error("Integer literal overflow, valid range is [0, {}]", i32::MAX)]
    IntOverflow,

    /// Un literal numérico no se convierte a un double.
    #[error("Numeric literal `{0}` does not convert to a double")]
    BadLiteral(String),

    /// La entrada terminó dentro de un comentario de bloque.
    #[error("Unterminated block comment")]
    UnterminatedComment,
}

/// Objeto resultante del análisis léxico.
///
/// Un token contiene suficiente información para describir completamente
/// a una entidad léxica en el programa fuente.
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    /// Identificador.
    Id(String),

    /// Palabra clave.
    Keyword(Keyword),

    /// Literal de entero.
    IntLiteral(i32),

    /// Literal de punto flotante.
    FloatLiteral(f64),

    /// `=`
    Assign,

    /// `==`
    Equal,

    /// `!=`
    NotEqual,

    /// `<`
    Less,

    /// `<=`
    LessOrEqual,

    /// `>`
    Greater,

    /// `>=`
    GreaterOrEqual,

    /// `!`
    Not,

    /// `||`
    Or,

    /// `&&`
    And,

    /// `+`
    Plus,

    /// `-`
    Minus,

    /// `*`
    Times,

    /// `/`
    Divide,

    /// `^`
    Raise,

    /// `&`
    Reference,

    /// `(`
    OpenParen,

    /// `)`
    CloseParen,

    /// `[`
    OpenBracket,

    /// `]`
    CloseBracket,

    /// `{`
    OpenCurly,

    /// `}`
    CloseCurly,

    /// `;`
    Semicolon,

    /// `,`
    Comma,
}

impl Display for Token {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        use Token::*;

        match self {
            Id(id) => write!(fmt, "identifier `{}`", id),
            Keyword(keyword) => write!(fmt, "keyword `{}`", keyword),
            IntLiteral(integer) => write!(fmt, "literal `{}`", integer),
            FloatLiteral(float) => write!(fmt, "literal `{}`", float),
            Assign => fmt.write_str("`=`"),
            Equal => fmt.write_str("`==`"),
            NotEqual => fmt.write_str("`!=`"),
            Less => fmt.write_str("`<`"),
            LessOrEqual => fmt.write_str("`<=`"),
            Greater => fmt.write_str("`>`"),
            GreaterOrEqual => fmt.write_str("`>=`"),
            Not => fmt.write_str("`!`"),
            Or => fmt.write_str("`||`"),
            And => fmt.write_str("`&&`"),
            Plus => fmt.write_str("`+`"),
            Minus => fmt.write_str("`-`"),
            Times => fmt.write_str("`*`"),
            Divide => fmt.write_str("`/`"),
            Raise => fmt.write_str("`^`"),
            Reference => fmt.write_str("`&`"),
            OpenParen => fmt.write_str("`(`"),
            CloseParen => fmt.write_str("`)`"),
            OpenBracket => fmt.write_str("`[`"),
            CloseBracket => fmt.write_str("`]`"),
            OpenCurly => fmt.write_str("`{`"),
            CloseCurly => fmt.write_str("`}`"),
            Semicolon => fmt.write_str("`;`"),
            Comma => fmt.write_str("`,`"),
        }
    }
}

/// Una palabra clave.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Keyword {
    Void,
    Double,
    Const,
    If,
    Else,
}

impl Display for Keyword {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        use Keyword::*;

        let string = match self {
            Void => "void",
            Double => "double",
            Const => "const",
            If => "if",
            Else => "else",
        };

        fmt.write_str(string)
    }
}

impl FromStr for Keyword {
    type Err = ();

    fn from_str(string: &str) -> Result<Self, Self::Err> {
        use Keyword::*;

        match string {
            "void" => Ok(Void),
            "double" => Ok(Double),
            "const" => Ok(Const),
            "if" => Ok(If),
            "else" => Ok(Else),
            _ => Err(()),
        }
    }
}

/// Máquina de estados para análisis léxico.
///
/// Un lexer puede encontrarse en uno de diversos estados. La salida del
/// lexer, así como su siguiente estado, se define a partir de tanto su
/// estado actual como el siguiente carácter encontrado en la entrada.
pub struct Lexer<'a> {
    source: Peekable<Chars<'a>>,
    from: Rc<Source>,
    state: State,
    start: Position,
    next: Position,
}

/// Posibles estados del lexer.
enum State {
    /// Estado que ocurre antes de encontrar el inicio de un token.
    Start,

    /// Estado de completitud; siempre emite el token incluido sin
    /// consumir la entrada actual y pasa a [`State::Start`].
    Complete(Token),

    /// Se encontró `/`.
    ///
    /// Un `*` a continuación abre un comentario; cualquier otra cosa
    /// emite una división.
    Slash,

    /// Comentario de bloque.
    Comment,

    /// Se encontró `*` dentro de un comentario de bloque.
    CommentStar,

    /// Se encontró un `0` inicial.
    ///
    /// El lenguaje no admite ceros a la izquierda, por lo cual un dígito
    /// a continuación termina la constante de inmediato.
    Zero,

    /// Parte entera de una constante numérica.
    Integer(String),

    /// Parte fraccionaria de una constante de punto flotante.
    Fraction(String),

    /// Se acaba de consumir la `e` de un exponente validado por sondeo.
    ExponentMark(String),

    /// Dígitos del exponente.
    Exponent(String),

    /// Término que puede ser un identificador o una palabra clave.
    Word(String),

    /// Se encontró `&`.
    Amp,

    /// Se encontró `|`.
    Pipe,

    /// Se encontró `!`.
    Bang,

    /// Se encontró `<`.
    LessThan,

    /// Se encontró `>`.
    GreaterThan,

    /// Se encontró `=`.
    EqSign,
}

impl<'a> Lexer<'a> {
    /// Crea un lexer en estado inicial sobre una unidad de compilación.
    ///
    /// El texto prestado debe ser el mismo que retiene `from`.
    pub fn new(from: &Rc<Source>, text: &'a str) -> Self {
        Lexer {
            source: text.chars().peekable(),
            from: Rc::clone(from),
            state: State::Start,
            start: Position::default(),
            next: Position::default(),
        }
    }

    /// Reduce la entrada completa a una secuencia de tokens o al primer
    /// error de escaneo encontrado.
    pub fn tokenize(mut self) -> Result<Vec<Located<Token>>, Located<LexerError>> {
        let mut tokens = Vec::new();

        while let Some(result) = self.next() {
            tokens.push(result?);
        }

        Ok(tokens)
    }

    /// Intenta construir un siguiente token.
    fn lex(&mut self) -> Result<Option<Token>, LexerError> {
        use {State::*, Token::*};

        let token = loop {
            let next_char = self.source.peek().copied();

            // La posición de origen se mueve junto a la posición
            // siguiente siempre que no se haya encontrado una
            // frontera de token
            if let Start = self.state {
                self.start = self.next;
            }

            // Una `e` solo pertenece al número si el sondeo encuentra
            // un exponente bien formado después de ella
            let exponent_ok =
                matches!(next_char, Some('e') | Some('E')) && self.exponent_follows();

            // Switch table principal, determina cambios de estado
            // y de salida del lexer a partir de combinaciones del
            // estado actual y el siguiente carácter
            match (&mut self.state, next_char) {
                (Start, None) => return Ok(None),

                // Tokens triviales
                (Start, Some('+')) => self.state = Complete(Plus),
                (Start, Some('-')) => self.state = Complete(Minus),
                (Start, Some('*')) => self.state = Complete(Times),
                (Start, Some('^')) => self.state = Complete(Raise),
                (Start, Some('(')) => self.state = Complete(OpenParen),
                (Start, Some(')')) => self.state = Complete(CloseParen),
                (Start, Some('[')) => self.state = Complete(OpenBracket),
                (Start, Some(']')) => self.state = Complete(CloseBracket),
                (Start, Some('{')) => self.state = Complete(OpenCurly),
                (Start, Some('}')) => self.state = Complete(CloseCurly),
                (Start, Some(';')) => self.state = Complete(Semicolon),
                (Start, Some(',')) => self.state = Complete(Comma),

                // Prefijos de operadores de uno o dos caracteres
                (Start, Some('=')) => self.state = EqSign,
                (Start, Some('!')) => self.state = Bang,
                (Start, Some('<')) => self.state = LessThan,
                (Start, Some('>')) => self.state = GreaterThan,
                (Start, Some('&')) => self.state = Amp,
                (Start, Some('|')) => self.state = Pipe,
                (Start, Some('/')) => self.state = Slash,

                // Identificadores, palabras clave y constantes
                (Start, Some('0')) => self.state = Zero,
                (Start, Some(c)) if c.is_ascii_digit() => self.state = Integer(c.to_string()),

                (Start, Some(c)) if c == '_' || c.is_ascii_alphabetic() => {
                    self.state = Word(c.to_string())
                }

                // Espacios en blanco y caracteres inesperados
                (Start, Some(c)) if c.is_ascii_whitespace() => (),
                (Start, Some(c)) => break Err(LexerError::BadChar(c)),

                // Emisión retardada de tokens cualesquiera
                (Complete(value), _) => break Ok(mem::replace(value, Plus)),

                (EqSign, Some('=')) => self.state = Complete(Equal),
                (EqSign, _) => break Ok(Assign),

                (Bang, Some('=')) => self.state = Complete(NotEqual),
                (Bang, _) => break Ok(Not),

                (LessThan, Some('=')) => self.state = Complete(LessOrEqual),
                (LessThan, _) => break Ok(Less),

                (GreaterThan, Some('=')) => self.state = Complete(GreaterOrEqual),
                (GreaterThan, _) => break Ok(Greater),

                (Amp, Some('&')) => self.state = Complete(And),
                (Amp, _) => break Ok(Reference),

                // No existe un token `|` de un solo carácter
                (Pipe, Some('|')) => self.state = Complete(Or),
                (Pipe, _) => break Err(LexerError::Expected('|')),

                // `/` seguido de `*` abre un comentario de bloque
                (Slash, Some('*')) => self.state = Comment,
                (Slash, _) => break Ok(Divide),

                (Comment, Some('*')) => self.state = CommentStar,
                (Comment, Some(_)) => (),
                (Comment, None) => break Err(LexerError::UnterminatedComment),

                (CommentStar, Some('/')) => self.state = Start,
                (CommentStar, Some('*')) => (),
                (CommentStar, Some(_)) => self.state = Comment,
                (CommentStar, None) => break Err(LexerError::UnterminatedComment),

                // Un cero inicial termina la parte entera por sí solo
                (Zero, Some('.')) => self.state = Fraction(String::from("0.")),
                (Zero, Some(c @ ('e' | 'E'))) if exponent_ok => {
                    self.state = ExponentMark(format!("0{}", c))
                }
                (Zero, _) => break Ok(IntLiteral(0)),

                // Acumulación dígito por dígito de la parte entera
                (Integer(digits), Some(c)) if c.is_ascii_digit() => digits.push(c),

                (Integer(digits), Some('.')) => {
                    let mut digits = mem::take(digits);
                    digits.push('.');
                    self.state = Fraction(digits);
                }

                (Integer(digits), Some(c @ ('e' | 'E'))) if exponent_ok => {
                    let mut digits = mem::take(digits);
                    digits.push(c);
                    self.state = ExponentMark(digits);
                }

                // Si sigue algo que no continúa el número, la constante
                // entera ha terminado
                (Integer(digits), _) => break integer_token(mem::take(digits)),

                (Fraction(digits), Some(c)) if c.is_ascii_digit() => digits.push(c),

                (Fraction(digits), Some(c @ ('e' | 'E'))) if exponent_ok => {
                    let mut digits = mem::take(digits);
                    digits.push(c);
                    self.state = ExponentMark(digits);
                }

                (Fraction(digits), _) => break float_token(mem::take(digits)),

                // El sondeo garantiza un signo o un dígito aquí
                (ExponentMark(digits), Some(c @ ('+' | '-'))) => {
                    let mut digits = mem::take(digits);
                    digits.push(c);
                    self.state = Exponent(digits);
                }

                (ExponentMark(digits), Some(c)) if c.is_ascii_digit() => {
                    let mut digits = mem::take(digits);
                    digits.push(c);
                    self.state = Exponent(digits);
                }

                (ExponentMark(digits), _) => {
                    break Err(LexerError::BadLiteral(mem::take(digits)))
                }

                (Exponent(digits), Some(c)) if c.is_ascii_digit() => digits.push(c),
                (Exponent(digits), _) => break float_token(mem::take(digits)),

                // Extensión de términos
                (Word(word), Some(c)) if is_word_char(c) => word.push(c),

                // Si sigue algo que no puede formar parte del término,
                // ha terminado
                (Word(word), _) => {
                    if let Ok(keyword) = self::Keyword::from_str(word.as_str()) {
                        break Ok(Keyword(keyword));
                    } else {
                        break Ok(Id(mem::take(word)));
                    }
                }
            }

            // Si no hubo `break`, aquí se consume el carácter que
            // se observó con lookahead anteriormente
            if let Some(c) = self.source.next() {
                self.next = self.next.after(c);
            }
        };

        token.map(Some)
    }

    /// Determina si lo que sigue a la `e` observada con lookahead es un
    /// exponente bien formado.
    fn exponent_follows(&mut self) -> bool {
        let mut probe = self.source.clone();
        probe.next();

        match probe.next() {
            Some(c) if c.is_ascii_digit() => true,
            Some('+') | Some('-') => matches!(probe.next(), Some(c) if c.is_ascii_digit()),
            _ => false,
        }
    }
}

impl Iterator for Lexer<'_> {
    type Item = Result<Located<Token>, Located<LexerError>>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.lex() {
            Ok(None) => None,
            Ok(Some(token)) => {
                self.state = State::Start;

                let location = Location::new(Rc::clone(&self.from), self.start..self.next);
                Some(Ok(Located::at(token, location)))
            }

            Err(error) => {
                self.state = State::Start;

                let location =
                    Location::new(Rc::clone(&self.from), self.next..self.next.advance());
                Some(Err(Located::at(error, location)))
            }
        }
    }
}

fn integer_token(digits: String) -> Result<Token, LexerError> {
    digits
        .parse()
        .map(Token::IntLiteral)
        .map_err(|_| LexerError::IntOverflow)
}

fn float_token(digits: String) -> Result<Token, LexerError> {
    digits
        .parse()
        .map(Token::FloatLiteral)
        .map_err(|_| LexerError::BadLiteral(digits))
}

/// Determina si un carácter puede pertenecer a un término.
fn is_word_char(c: char) -> bool {
    c == '_' || c.is_ascii_alphabetic() || c.is_ascii_digit()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(text: &str) -> Vec<Token> {
        let source = Source::new("test", text);
        Lexer::new(&source, text)
            .tokenize()
            .expect("lexing failed")
            .into_iter()
            .map(Located::into_inner)
            .collect()
    }

    fn error(text: &str) -> LexerError {
        let source = Source::new("test", text);
        Lexer::new(&source, text)
            .tokenize()
            .expect_err("lexing should fail")
            .into_inner()
    }

    #[test]
    fn signature_tokens() {
        use Token::*;
        use self::Keyword::*;

        assert_eq!(
            tokens("void f(const double x[3], double& rho)"),
            vec![
                Keyword(Void),
                Id("f".into()),
                OpenParen,
                Keyword(Const),
                Keyword(Double),
                Id("x".into()),
                OpenBracket,
                IntLiteral(3),
                CloseBracket,
                Comma,
                Keyword(Double),
                Reference,
                Id("rho".into()),
                CloseParen,
            ]
        );
    }

    #[test]
    fn two_character_operators() {
        use Token::*;

        assert_eq!(
            tokens("== != <= >= && || = < > ! & ^"),
            vec![
                Equal, NotEqual, LessOrEqual, GreaterOrEqual, And, Or, Assign, Less, Greater,
                Not, Reference, Raise,
            ]
        );
    }

    #[test]
    fn float_forms() {
        use Token::*;

        assert_eq!(
            tokens("1 1. 1.5 0.5 1e3 2.5e-2 0e1"),
            vec![
                IntLiteral(1),
                FloatLiteral(1.0),
                FloatLiteral(1.5),
                FloatLiteral(0.5),
                FloatLiteral(1000.0),
                FloatLiteral(0.025),
                FloatLiteral(0.0),
            ]
        );
    }

    #[test]
    fn loose_exponent_is_an_identifier() {
        use Token::*;

        // `2e` no forma un exponente; la `e` comienza un término aparte
        assert_eq!(tokens("2e"), vec![IntLiteral(2), Id("e".into())]);
        assert_eq!(
            tokens("2e+"),
            vec![IntLiteral(2), Id("e".into()), Plus]
        );
    }

    #[test]
    fn no_leading_zeros() {
        use Token::*;

        assert_eq!(tokens("01"), vec![IntLiteral(0), IntLiteral(1)]);
    }

    #[test]
    fn block_comments_are_skipped() {
        use Token::*;

        assert_eq!(
            tokens("a /* x ** y */ = /* otro */ b ;"),
            vec![Id("a".into()), Assign, Id("b".into()), Semicolon]
        );
    }

    #[test]
    fn errors() {
        assert!(matches!(error("a # b"), LexerError::BadChar('#')));
        assert!(matches!(error("a | b"), LexerError::Expected('|')));
        assert!(matches!(error("9999999999"), LexerError::IntOverflow));
        assert!(matches!(error("/* sin fin"), LexerError::UnterminatedComment));
    }

    #[test]
    fn locations() {
        let text = "x =\n  y;";
        let source = Source::new("test", text);
        let tokens: Vec<_> = Lexer::new(&source, text)
            .tokenize()
            .expect("lexing failed");

        let y = &tokens[2];
        assert_eq!(y.location().start().line(), 2);
        assert_eq!(y.location().start().column(), 3);
    }
}
