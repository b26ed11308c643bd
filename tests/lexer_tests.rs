use rtinyc::tokenizer::{Token, TokenKind, Tokenizer};

fn collect_tokens(source: &str) -> Vec<Token> {
  let mut tokenizer = Tokenizer::new(source);
  let mut tokens = Vec::new();
  loop {
    let token = tokenizer.next_token();
    let done = matches!(token.kind, TokenKind::Eof | TokenKind::Error);
    tokens.push(token);
    if done {
      break;
    }
  }
  tokens
}

fn kinds(source: &str) -> Vec<TokenKind> {
  collect_tokens(source)
    .into_iter()
    .map(|token| token.kind)
    .collect()
}

#[test]
fn lexes_a_minimal_program() {
  assert_eq!(
    kinds("int main() { return 42; }"),
    vec![
      TokenKind::Int,
      TokenKind::Identifier,
      TokenKind::LeftParen,
      TokenKind::RightParen,
      TokenKind::LeftBrace,
      TokenKind::Return,
      TokenKind::Number,
      TokenKind::Semicolon,
      TokenKind::RightBrace,
      TokenKind::Eof,
    ]
  );
}

#[test]
fn keywords_win_over_identifiers() {
  let tokens = collect_tokens("if ifx else elsewhere while for return void");
  assert_eq!(tokens[0].kind, TokenKind::If);
  assert_eq!(tokens[1].kind, TokenKind::Identifier);
  assert_eq!(tokens[1].lexeme.as_deref(), Some("ifx"));
  assert_eq!(tokens[2].kind, TokenKind::Else);
  assert_eq!(tokens[3].kind, TokenKind::Identifier);
  assert_eq!(tokens[4].kind, TokenKind::While);
  assert_eq!(tokens[5].kind, TokenKind::For);
  assert_eq!(tokens[6].kind, TokenKind::Return);
  assert_eq!(tokens[7].kind, TokenKind::Void);
}

#[test]
fn two_character_operators_take_precedence() {
  assert_eq!(
    kinds("== = != ! <= < >= > && ||"),
    vec![
      TokenKind::EqualEqual,
      TokenKind::Equal,
      TokenKind::BangEqual,
      TokenKind::Bang,
      TokenKind::LessEqual,
      TokenKind::Less,
      TokenKind::GreaterEqual,
      TokenKind::Greater,
      TokenKind::AndAnd,
      TokenKind::OrOr,
      TokenKind::Eof,
    ]
  );
}

#[test]
fn number_lexeme_is_the_digit_run() {
  let tokens = collect_tokens("12345");
  assert_eq!(tokens[0].kind, TokenKind::Number);
  assert_eq!(tokens[0].lexeme.as_deref(), Some("12345"));
}

#[test]
fn string_literal_keeps_escape_pairs_verbatim() {
  let tokens = collect_tokens("\"hello\\nworld\"");
  assert_eq!(tokens[0].kind, TokenKind::String);
  // the backslash-n pair is preserved, not decoded
  assert_eq!(tokens[0].lexeme.as_deref(), Some("hello\\nworld"));
}

#[test]
fn unterminated_string_is_an_error_at_the_opening_quote() {
  let tokens = collect_tokens("int x; \"oops");
  let last = tokens.last().expect("token stream is never empty");
  assert_eq!(last.kind, TokenKind::Error);
  assert_eq!(last.lexeme.as_deref(), Some("Unterminated string"));
  assert_eq!(last.line, 1);
  assert_eq!(last.column, 8);
}

#[test]
fn stray_ampersand_and_pipe_are_errors() {
  let tokens = collect_tokens("a & b");
  let error = &tokens[1];
  assert_eq!(error.kind, TokenKind::Error);
  assert_eq!(error.lexeme.as_deref(), Some("Unexpected character"));

  let tokens = collect_tokens("a | b");
  assert_eq!(tokens[1].kind, TokenKind::Error);
}

#[test]
fn unknown_byte_reports_the_character() {
  let tokens = collect_tokens("@");
  assert_eq!(tokens[0].kind, TokenKind::Error);
  assert_eq!(tokens[0].lexeme.as_deref(), Some("Unexpected character: '@'"));
}

#[test]
fn comments_are_skipped() {
  assert_eq!(
    kinds("1 // line comment\n/* block\ncomment */ 2"),
    vec![TokenKind::Number, TokenKind::Number, TokenKind::Eof]
  );
}

#[test]
fn unterminated_block_comment_is_diagnosed() {
  let tokens = collect_tokens("int x; /* runs off");
  let last = tokens.last().expect("token stream is never empty");
  assert_eq!(last.kind, TokenKind::Error);
  assert_eq!(last.lexeme.as_deref(), Some("Unterminated comment"));
  assert_eq!(last.column, 8);
}

#[test]
fn positions_are_one_based_and_track_newlines() {
  let tokens = collect_tokens("int\n  main");
  assert_eq!((tokens[0].line, tokens[0].column), (1, 1));
  assert_eq!((tokens[1].line, tokens[1].column), (2, 3));
}

#[test]
fn peek_matches_the_following_next() {
  let mut tokenizer = Tokenizer::new("int x = 40 + 2;");
  loop {
    let peeked = tokenizer.peek_token();
    let next = tokenizer.next_token();
    assert_eq!(peeked, next);
    if next.kind == TokenKind::Eof {
      break;
    }
  }
}

#[test]
fn peek_does_not_disturb_positions() {
  let mut tokenizer = Tokenizer::new("a\nb");
  tokenizer.peek_token();
  let first = tokenizer.next_token();
  assert_eq!((first.line, first.column), (1, 1));
  tokenizer.peek_token();
  let second = tokenizer.next_token();
  assert_eq!((second.line, second.column), (2, 1));
}

#[test]
fn eof_repeats_after_end_of_input() {
  let mut tokenizer = Tokenizer::new("x");
  tokenizer.next_token();
  assert_eq!(tokenizer.next_token().kind, TokenKind::Eof);
  assert_eq!(tokenizer.next_token().kind, TokenKind::Eof);
}

#[test]
fn reset_rewinds_to_the_start() {
  let mut tokenizer = Tokenizer::new("int x;");
  tokenizer.next_token();
  tokenizer.next_token();
  tokenizer.reset();
  let token = tokenizer.next_token();
  assert_eq!(token.kind, TokenKind::Int);
  assert_eq!((token.line, token.column), (1, 1));
}
