use crate::lex::LexerError;
use crate::parse::ParserError;
use crate::source::{Located, Location};
use std::{
    error::Error,
    fmt::{self, Display},
};

/// Falla fatal de una compilación.
///
/// No hay advertencias ni recuperación: la compilación entrega una
/// función completamente enlazada o uno de estos errores.
#[derive(Debug)]
pub enum CompileError {
    /// La entrada no se descompone en tokens.
    Lex(Located<LexerError>),

    /// La secuencia de tokens no corresponde a la gramática, o viola
    /// una regla impuesta durante la reducción.
    Parse(Located<ParserError>),

    /// Un slot de salida declarado no recibe ningún valor final.
    MissingOutput(String),
}

impl From<Located<LexerError>> for CompileError {
    fn from(error: Located<LexerError>) -> Self {
        CompileError::Lex(error)
    }
}

impl From<Located<ParserError>> for CompileError {
    fn from(error: Located<ParserError>) -> Self {
        CompileError::Parse(error)
    }
}

impl Display for CompileError {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompileError::Lex(error) => located(fmt, error.val(), error.location()),
            CompileError::Parse(error) => located(fmt, error.val(), error.location()),

            CompileError::MissingOutput(name) => writeln!(
                fmt,
                "error: function does not set required output variable `{}`",
                name
            ),
        }
    }
}

impl Error for CompileError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            CompileError::Lex(error) => Some(error.val()),
            CompileError::Parse(error) => Some(error.val()),
            CompileError::MissingOutput(_) => None,
        }
    }
}

/// Reporta un error con su extracto de código fuente y subrayado.
fn located(fmt: &mut fmt::Formatter<'_>, error: &dyn Display, location: &Location) -> fmt::Result {
    writeln!(fmt, "error: {}", error)?;
    writeln!(fmt, " --> {}", location)?;

    let digits = location.end().line().to_string().chars().count();
    writeln!(fmt, "{:digits$} |", "")?;

    for line_number in location.start().line()..=location.end().line() {
        if let Some(line) = location.source().line(line_number) {
            writeln!(fmt, "{:>digits$} | {}", line_number, line)?;
        }
    }

    let from = location.start().column();
    let to = location.end().column().saturating_sub(1);
    let min = from.min(to).max(1);
    let max = from.max(to);

    let skip = (min - 1) as usize;
    let highlight = (max - min + 1) as usize;

    writeln!(fmt, "{:digits$} | {:skip$}{:^<highlight$}", "", "", "")
}
