use crate::scanner::token::TokenType;

/// Reserved words, matched exactly against a scanned identifier.
pub const KEYWORDS: &[(&str, TokenType)] = &[
    ("and", TokenType::And),
    ("break", TokenType::Break),
    ("class", TokenType::Class),
    ("continue", TokenType::Continue),
    ("else", TokenType::Else),
    ("false", TokenType::False),
    ("for", TokenType::For),
    ("fun", TokenType::Fun),
    ("if", TokenType::If),
    ("nil", TokenType::Nil),
    ("or", TokenType::Or),
    ("print", TokenType::Print),
    ("return", TokenType::Return),
    ("super", TokenType::Super),
    ("this", TokenType::This),
    ("true", TokenType::True),
    ("var", TokenType::Var),
    ("while", TokenType::While),
];

pub fn keyword(text: &str) -> Option<TokenType> {
    KEYWORDS
        .iter()
        .find(|(word, _)| *word == text)
        .map(|(_, token_type)| token_type.clone())
}
