pub mod lex;
pub mod replay;
