use std::env;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

fn main() {
    let path = Path::new(&env::var("OUT_DIR").unwrap()).join("keywords.rs");
    let mut file = BufWriter::new(File::create(&path).unwrap());

    write!(
        &mut file,
        "pub static KEYWORDS: phf::Map<&'static str, TokenKind> = {}",
        phf_codegen::Map::new()
            .entry("and", "TokenKind::And")
            .entry("class", "TokenKind::Class")
            .entry("else", "TokenKind::Else")
            .entry("false", "TokenKind::False")
            .entry("for", "TokenKind::For")
            .entry("fun", "TokenKind::Fun")
            .entry("if", "TokenKind::If")
            .entry("nil", "TokenKind::Nil")
            .entry("or", "TokenKind::Or")
            .entry("print", "TokenKind::Print")
            .entry("return", "TokenKind::Return")
            .entry("super", "TokenKind::Super")
            .entry("this", "TokenKind::This")
            .entry("true", "TokenKind::True")
            .entry("var", "TokenKind::Var")
            .entry("while", "TokenKind::While")
            .build()
    )
    .unwrap();
    writeln!(&mut file, ";").unwrap(); // Fixed as suggested by clippy
}
