//! End-to-end scenarios compiled to assembly text and checked structurally
//! (no assembler or linker is invoked; see the driver's own doc comment).

use cc_driver::{compile, Arch, CompileRequest};

fn compile_snippet(src: &str) -> String {
    let req = CompileRequest {
        entry_name: "t.c".to_string(),
        entry_contents: src.to_string(),
        search_dirs: Vec::new(),
        defines: Vec::new(),
        pic: true,
        arch: Arch::X86_64,
    };
    compile(req).expect("snippet should compile")
}

// Every scenario here defines exactly one function (`main`), so the rest of
// the assembly after its label is its whole body.
fn main_body(asm: &str) -> &str {
    let start = asm.find("main:").expect("main label");
    &asm[start..]
}

#[test]
fn arithmetic_respects_operator_precedence() {
    let asm = compile_snippet("int main(){ return 1+2*3; }\n");
    let body = main_body(&asm);
    // 2*3 must be computed (imul) before being added to 1 (add), not the
    // other way around — precedence, not just "some arithmetic happened".
    let mul_at = body.find("imul").expect("a multiply for 2*3");
    let add_at = body.find("add ").expect("an add for 1+(2*3)");
    assert!(mul_at < add_at, "imul should precede add under correct precedence:\n{body}");
    assert!(body.contains("$1"));
    assert!(body.contains("$2"));
    assert!(body.contains("$3"));
    assert!(asm.contains("ret"));
}

#[test]
fn pointer_arithmetic_through_array_decay() {
    let asm = compile_snippet("int main(){ int a[3]={1,2,3}; int *p=a; return *(p+2); }\n");
    let body = main_body(&asm);
    // `p+2` scales the index by sizeof(int) before adding to the pointer.
    assert!(body.contains("$4"), "the index should be scaled by sizeof(int):\n{body}");
    assert!(body.contains("imul"), "pointer+int needs a multiply to scale the index:\n{body}");
    assert!(asm.contains("ret"));
}

#[test]
fn preprocessor_conditional_keeps_only_the_live_branch() {
    let src = "#define N 3\n#if N > 2\nint main(){ return N; }\n#else\nint main(){ return 0; }\n#endif\n";
    let asm = compile_snippet(src);
    let occurrences = asm.matches("main:").count();
    assert_eq!(occurrences, 1, "only one main should survive the conditional:\n{asm}");
    let body = main_body(&asm);
    assert!(body.contains("$3"), "N should have expanded to 3:\n{body}");
}

#[test]
fn struct_layout_with_bitfield_sizes_to_eight_bytes() {
    let src = "struct S { int a:3; int b:5; int c; };\nint main(){ return sizeof(struct S); }\n";
    let asm = compile_snippet(src);
    let body = main_body(&asm);
    assert!(body.contains("$8"), "struct S should be constant-folded to 8 bytes:\n{body}");
}

#[test]
fn variadic_call_marshals_args_and_a_sentinel() {
    let src = "extern int add_all1(int,...);\nint main(){ return add_all1(1,2,3,0); }\n";
    let asm = compile_snippet(src);
    assert!(asm.contains("call"));
    assert!(asm.contains("add_all1"));
    assert!(asm.contains("%al"), "variadic calls set %al to the FP register count:\n{asm}");
}

#[test]
fn a_seventh_integer_argument_spills_to_the_stack() {
    let src = "extern int sum7(int,int,int,int,int,int,int);\n\
               int main(){ return sum7(1,2,3,4,5,6,7); }\n";
    let asm = compile_snippet(src);
    assert!(asm.contains("call"));
    assert!(asm.contains("sum7"));
    // the 7th argument can't fit in rdi..r9, so it has to go through the
    // stack, and the caller has to clean it back up after the call.
    assert!(asm.contains("add $8, %rsp"), "the 7th argument's stack slot should be caller-cleaned:\n{asm}");
}

#[test]
fn a_seventh_integer_parameter_is_read_from_the_caller_stack() {
    let src = "int sum7(int a,int b,int c,int d,int e,int f,int g){ return g; }\n";
    let asm = compile_snippet(src);
    assert!(asm.contains("sum7:"));
    // the 7th parameter never arrives in a register; it's read back out of
    // the caller's frame at 16(%rbp), the first stack slot above the
    // return address and saved %rbp.
    assert!(asm.contains("16(%rbp)"), "the 7th parameter should be read from the caller's stack:\n{asm}");
}

#[test]
fn adjacent_string_literals_concatenate_before_sizeof() {
    let asm = compile_snippet("int main(){ return sizeof(\"a\" \"bc\"); }\n");
    let body = main_body(&asm);
    assert!(body.contains("$4"), "\"a\" \"bc\" should concatenate to a 4-byte string:\n{body}");
}

#[test]
fn rv64_backend_emits_a_structurally_parallel_function() {
    let req = CompileRequest {
        entry_name: "t.c".to_string(),
        entry_contents: "int main(){ return 1+2*3; }\n".to_string(),
        search_dirs: Vec::new(),
        defines: Vec::new(),
        pic: true,
        arch: Arch::Rv64,
    };
    let asm = compile(req).expect("rv64 snippet should compile");
    assert!(asm.contains("main:"));
    assert!(asm.contains("ret"));
}

#[test]
fn preprocess_only_mode_expands_macros_without_generating_code() {
    let (toks, files) = cc_driver::run_preprocessor(&CompileRequest {
        entry_name: "t.c".to_string(),
        entry_contents: "#define TWO 2\nint x = TWO;\n".to_string(),
        search_dirs: Vec::new(),
        defines: Vec::new(),
        pic: true,
        arch: Arch::X86_64,
    })
    .expect("preprocessing should succeed");
    let rendered = cc_driver::render_preprocessed(&toks, &files);
    assert_eq!(rendered, "int x = 2;\n");
}

#[test]
fn quoted_include_resolves_against_a_real_header_on_disk() {
    let dir = tempfile::tempdir().expect("tempdir");
    let header_path = dir.path().join("value.h");
    std::fs::write(&header_path, "#define VALUE 5\n").expect("write header");

    let entry_path = dir.path().join("t.c");
    let entry_contents = "#include \"value.h\"\nint main(){ return VALUE; }\n".to_string();
    std::fs::write(&entry_path, &entry_contents).expect("write entry");

    let req = CompileRequest {
        entry_name: entry_path.display().to_string(),
        entry_contents,
        search_dirs: Vec::new(),
        defines: Vec::new(),
        pic: true,
        arch: Arch::X86_64,
    };
    let asm = compile(req).expect("quoted #include should resolve next to the including file");
    let body = main_body(&asm);
    assert!(body.contains("$5"), "VALUE should have come from value.h:\n{body}");
}

#[test]
fn angled_include_resolves_against_a_configured_search_dir() {
    let dir = tempfile::tempdir().expect("tempdir");
    let include_dir = dir.path().join("include");
    std::fs::create_dir(&include_dir).expect("mkdir include");
    std::fs::write(include_dir.join("value.h"), "#define VALUE 7\n").expect("write header");

    let req = CompileRequest {
        entry_name: "t.c".to_string(),
        entry_contents: "#include <value.h>\nint main(){ return VALUE; }\n".to_string(),
        search_dirs: vec![include_dir],
        defines: Vec::new(),
        pic: true,
        arch: Arch::X86_64,
    };
    let asm = compile(req).expect("angled #include should resolve against a -I dir");
    let body = main_body(&asm);
    assert!(body.contains("$7"), "VALUE should have come from the -I header:\n{body}");
}

#[test]
fn command_line_define_is_visible_to_the_preprocessor() {
    let asm_with_define = {
        let req = CompileRequest {
            entry_name: "t.c".to_string(),
            entry_contents: "int main(){ return VALUE; }\n".to_string(),
            search_dirs: Vec::new(),
            defines: vec!["VALUE=9".to_string()],
            pic: true,
            arch: Arch::X86_64,
        };
        compile(req).expect("should compile with -D")
    };
    let body = main_body(&asm_with_define);
    assert!(body.contains("$9"), "VALUE should have come from -D:\n{body}");
}
