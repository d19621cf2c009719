//! Minifies the browser scripts under `src/embed/serve/` into `OUT_DIR`.

use std::path::Path;
use std::{env, fs};

use oxc::allocator::Allocator;
use oxc::codegen::{Codegen, CodegenOptions, CommentOptions};
use oxc::mangler::MangleOptions;
use oxc::minifier::{CompressOptions, Minifier, MinifierOptions};
use oxc::parser::Parser;
use oxc::span::SourceType;

/// Script name and the placeholders that must survive minification.
const SCRIPTS: &[(&str, &[&str])] = &[
    ("client", &["__LUMEN_WS_URL__"]),
    ("probe", &[]),
];

fn main() {
    let out_dir = env::var("OUT_DIR").expect("OUT_DIR is set by cargo");

    for (name, placeholders) in SCRIPTS {
        let input = format!("src/embed/serve/{name}.js");
        println!("cargo:rerun-if-changed={input}");

        let source = fs::read_to_string(&input).unwrap_or_else(|e| panic!("{input}: {e}"));
        let code = minify(&input, &source);
        for placeholder in *placeholders {
            assert_eq!(
                code.matches(placeholder).count(),
                1,
                "{input}: expected exactly one {placeholder} after minification"
            );
        }

        let output = Path::new(&out_dir).join(format!("{name}.min.js"));
        fs::write(&output, code).unwrap_or_else(|e| panic!("{}: {e}", output.display()));
    }
}

fn minify(name: &str, source: &str) -> String {
    let allocator = Allocator::default();
    let parsed = Parser::new(&allocator, source, SourceType::mjs()).parse();
    if !parsed.errors.is_empty() {
        panic!("{name}: {:?}", parsed.errors);
    }

    let mut program = parsed.program;
    let minified = Minifier::new(MinifierOptions {
        mangle: Some(MangleOptions::default()),
        compress: Some(CompressOptions::smallest()),
    })
    .minify(&allocator, &mut program);

    Codegen::new()
        .with_options(CodegenOptions {
            minify: true,
            comments: CommentOptions::disabled(),
            ..CodegenOptions::default()
        })
        .with_scoping(minified.scoping)
        .build(&program)
        .code
}
