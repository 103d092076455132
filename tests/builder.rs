mod common;

use classweaver::jvm::opcodes::*;
use classweaver::jvm::{
    ClassGraph, ClassReader, ClassVisitor, ClassWriter, Constant, ConstantValue, Error, FrameSlot,
    MergePolicy, MethodVisitor, WriterSettings,
};
use common::{class_header, record, rewrite, single_method_class, static_method};

fn code_of(bytes: &[u8], descriptor: &str) -> Vec<u8> {
    let reader = ClassReader::new(bytes).unwrap();
    let code = reader.method_code("run", descriptor).unwrap();
    code.expect("method `run` has no code").to_vec()
}

fn jump_offset(code: &[u8], at: usize) -> i16 {
    i16::from_be_bytes([code[at + 1], code[at + 2]])
}

fn skip_three_nops(method: &mut dyn MethodVisitor) -> Result<(), Error> {
    let end = method.new_label();
    method.visit_jump_insn(GOTO, end)?;
    method.visit_insn(NOP)?;
    method.visit_insn(NOP)?;
    method.visit_insn(NOP)?;
    method.visit_label(end)?;
    method.visit_insn(RETURN)
}

#[test]
fn jump_over_three_instructions() {
    let bytes = single_method_class(WriterSettings::maxs_only(), "()V", skip_three_nops).unwrap();
    let code = code_of(&bytes, "()V");
    assert_eq!(code, vec![GOTO, 0, 6, NOP, NOP, NOP, RETURN]);

    // The target is exactly the three skipped bytes past the end of the `goto`
    let goto_length = 3;
    assert_eq!(jump_offset(&code, 0) - goto_length, 3);

    let events = record(&bytes).unwrap().method_events("run");
    assert_eq!(
        events,
        vec![
            String::from("code"),
            format!("jump {} L0", GOTO),
            format!("insn {}", NOP),
            format!("insn {}", NOP),
            format!("insn {}", NOP),
            String::from("label L0"),
            format!("insn {}", RETURN),
            String::from("maxs 0 0"),
        ]
    );
}

#[test]
fn skipped_code_is_replaced_when_frames_are_computed() {
    let bytes = single_method_class(WriterSettings::new(), "()V", skip_three_nops).unwrap();
    assert_eq!(code_of(&bytes, "()V"), vec![GOTO, 0, 6, NOP, NOP, ATHROW, RETURN]);

    let events = record(&bytes).unwrap().method_events("run");
    assert!(events.contains(&String::from("frame [] [Object(\"java/lang/Throwable\")]")));
    assert!(events.contains(&String::from("frame [] []")));
}

#[test]
fn dead_code_after_return() {
    let bytes = single_method_class(WriterSettings::new(), "()V", |method| {
        method.visit_insn(RETURN)?;
        method.visit_insn(NOP)?;
        method.visit_insn(NOP)?;
        method.visit_insn(RETURN)
    })
    .unwrap();
    assert_eq!(code_of(&bytes, "()V"), vec![RETURN, NOP, NOP, ATHROW]);

    let events = record(&bytes).unwrap().method_events("run");
    assert_eq!(
        &events[..4],
        &[
            String::from("code"),
            format!("insn {}", RETURN),
            String::from("label L0"),
            String::from("frame [] [Object(\"java/lang/Throwable\")]"),
        ]
    );
}

#[test]
fn labels_resolve_to_monotonic_offsets() {
    let bytes = single_method_class(WriterSettings::new(), "(I)V", |method| {
        let top = method.new_label();
        let bottom = method.new_label();
        method.visit_label(top)?;
        method.visit_var_insn(ILOAD, 0)?; // 0
        method.visit_jump_insn(IFEQ, bottom)?; // 1
        method.visit_iinc_insn(0, -1)?; // 4
        method.visit_var_insn(ILOAD, 0)?; // 7
        method.visit_jump_insn(IFNE, top)?; // 8
        method.visit_jump_insn(GOTO, top)?; // 11
        method.visit_label(bottom)?;
        method.visit_insn(RETURN) // 14
    })
    .unwrap();
    let code = code_of(&bytes, "(I)V");
    assert_eq!(code.len(), 15);
    assert_eq!((code[1], jump_offset(&code, 1)), (IFEQ, 13));
    assert_eq!((code[8], jump_offset(&code, 8)), (IFNE, -8));
    assert_eq!((code[11], jump_offset(&code, 11)), (GOTO, -11));
}

#[test]
fn long_conditional_jump() {
    let bytes = single_method_class(WriterSettings::new(), "(I)V", |method| {
        let end = method.new_label();
        method.visit_var_insn(ILOAD, 0)?;
        method.visit_jump_insn(IFEQ, end)?;
        for _ in 0..40_000 {
            method.visit_insn(NOP)?;
        }
        method.visit_label(end)?;
        method.visit_insn(RETURN)
    })
    .unwrap();

    let code = code_of(&bytes, "(I)V");
    assert_eq!(code.len(), 1 + 3 + 5 + 40_000 + 1);
    assert_eq!(&code[..5], &[ILOAD_0, IFNE, 0, 8, GOTO_W]);
    assert_eq!(i32::from_be_bytes([code[5], code[6], code[7], code[8]]), 40_005);
    assert_eq!(code[40_009], RETURN);

    // Reads back as the inverted condition around a `goto`, with a frame after the `goto`
    let events = record(&bytes).unwrap().method_events("run");
    assert_eq!(
        &events[..6],
        &[
            String::from("code"),
            format!("var {} 0", ILOAD),
            format!("jump {} L0", IFNE),
            format!("jump {} L1", GOTO),
            String::from("label L0"),
            String::from("frame [Integer] []"),
        ]
    );

    // Writing that again reproduces the same code
    let rewritten = rewrite(&bytes, WriterSettings::new()).unwrap();
    assert_eq!(code_of(&rewritten, "(I)V"), code);
}

/// `iload_0; ifeq L1; <first>; goto L2; L1: <second>; L2: pop; return`
fn merge_two_values(
    settings: WriterSettings,
    first: u8,
    second: u8,
) -> Result<Vec<u8>, Error> {
    single_method_class(settings, "(I)V", |method| {
        let other = method.new_label();
        let join = method.new_label();
        method.visit_var_insn(ILOAD, 0)?;
        method.visit_jump_insn(IFEQ, other)?;
        method.visit_insn(first)?;
        method.visit_jump_insn(GOTO, join)?;
        method.visit_label(other)?;
        method.visit_insn(second)?;
        method.visit_label(join)?;
        method.visit_insn(POP)?;
        method.visit_insn(RETURN)
    })
}

#[test]
fn incompatible_stack_entries_conflict() {
    match merge_two_values(WriterSettings::new(), ICONST_0, FCONST_0) {
        Err(Error::FrameConflict {
            method,
            offset,
            slot,
            first,
            second,
        }) => {
            assert_eq!(method, "me/Test.run(I)V");
            assert_eq!(offset, 9);
            assert_eq!(slot, FrameSlot::Stack(0));
            let mut types = vec![first, second];
            types.sort();
            assert_eq!(types, vec!["float", "int"]);
        }
        other => panic!("expected a frame conflict, got {:?}", other),
    }

    let mut lenient = WriterSettings::new();
    lenient.merge_policy = MergePolicy::Lenient;
    let bytes = merge_two_values(lenient, ICONST_0, FCONST_0).unwrap();
    let events = record(&bytes).unwrap().method_events("run");
    assert!(events.contains(&String::from("frame [Integer] [Top]")));

    // Without frames, the merge is always lenient
    assert!(merge_two_values(WriterSettings::maxs_only(), ICONST_0, FCONST_0).is_ok());
}

fn pick_an_animal(settings: WriterSettings) -> Result<Vec<u8>, Error> {
    let mut writer = ClassWriter::new(settings);
    writer.visit_header(&class_header("me/Zoo"))?;
    if let Some(mut method) = writer.visit_method(&static_method("pick", "(Z)Lme/Animal;"))? {
        let cat = method.new_label();
        let join = method.new_label();
        method.visit_code()?;
        method.visit_var_insn(ILOAD, 0)?;
        method.visit_jump_insn(IFEQ, cat)?;
        method.visit_type_insn(NEW, "me/Dog")?;
        method.visit_insn(DUP)?;
        method.visit_method_insn(INVOKESPECIAL, "me/Dog", "<init>", "()V", false)?;
        method.visit_jump_insn(GOTO, join)?;
        method.visit_label(cat)?;
        method.visit_type_insn(NEW, "me/Cat")?;
        method.visit_insn(DUP)?;
        method.visit_method_insn(INVOKESPECIAL, "me/Cat", "<init>", "()V", false)?;
        method.visit_label(join)?;
        method.visit_insn(ARETURN)?;
        method.visit_maxs(0, 0)?;
        method.visit_end()?;
    }
    writer.visit_end()?;
    writer.to_bytes()
}

#[test]
fn references_merge_to_their_common_superclass() {
    let mut graph = ClassGraph::new();
    graph.insert_lang_types();
    graph.add_class("me/Animal", "java/lang/Object");
    graph.add_class("me/Dog", "me/Animal");
    graph.add_class("me/Cat", "me/Animal");

    let bytes = pick_an_animal(WriterSettings::new().with_hierarchy(graph)).unwrap();
    let events = record(&bytes).unwrap().method_events("pick");
    assert!(events.contains(&String::from("frame [Integer] [Object(\"me/Animal\")]")));
    assert!(events.contains(&String::from("maxs 2 1")));

    // Without knowing the classes, the best guess is `java/lang/Object`
    let bytes = pick_an_animal(WriterSettings::new()).unwrap();
    let events = record(&bytes).unwrap().method_events("pick");
    assert!(events.contains(&String::from("frame [Integer] [Object(\"java/lang/Object\")]")));
}

#[test]
fn constants_are_interned_once() {
    let bytes = single_method_class(WriterSettings::new(), "()V", |method| {
        for constant in [
            ConstantValue::String(String::from("hello")),
            ConstantValue::Float(f32::NAN),
            ConstantValue::String(String::from("hello")),
            ConstantValue::Float(f32::NAN),
            ConstantValue::Float(0.0),
            ConstantValue::Float(-0.0),
        ] {
            method.visit_ldc_insn(&constant)?;
            method.visit_insn(POP)?;
        }
        method.visit_insn(RETURN)
    })
    .unwrap();

    let reader = ClassReader::new(&bytes).unwrap();
    let pool = reader.constant_pool();
    let count = |matches: &dyn Fn(&Constant) -> bool| {
        pool.iter().filter(|(_, constant)| matches(constant)).count()
    };
    assert_eq!(count(&|c| matches!(c, Constant::String(_))), 1);
    assert_eq!(
        count(&|c| matches!(c, Constant::Utf8(text) if text == "hello")),
        1
    );
    assert_eq!(count(&|c| matches!(c, Constant::Float(_))), 3);

    let events = record(&bytes).unwrap().method_events("run");
    assert!(events.contains(&String::from("ldc Float(0.0)")));
    assert!(events.contains(&String::from("ldc Float(-0.0)")));
}

#[test]
fn protocol_errors() {
    // Members before the header
    let mut writer = ClassWriter::new(WriterSettings::new());
    assert!(matches!(
        writer.visit_method(&static_method("run", "()V")),
        Err(Error::MissingHeader)
    ));

    // Placing a label twice
    let result = single_method_class(WriterSettings::new(), "()V", |method| {
        let label = method.new_label();
        method.visit_label(label)?;
        method.visit_label(label)
    });
    assert!(matches!(result, Err(Error::DuplicateLabel(_))));

    // Jumping to a label that is never placed
    let result = single_method_class(WriterSettings::new(), "()V", |method| {
        let nowhere = method.new_label();
        method.visit_jump_insn(GOTO, nowhere)
    });
    assert!(matches!(result, Err(Error::UnplacedLabel(_))));

    // Passing an opcode to the visit for another kind of instruction
    let result = single_method_class(WriterSettings::new(), "()V", |method| {
        method.visit_var_insn(BIPUSH, 0)
    });
    assert!(matches!(
        result,
        Err(Error::InvalidOpcode {
            opcode: BIPUSH,
            visit: "visit_var_insn"
        })
    ));

    // Appending code after the maxs
    let mut writer = ClassWriter::new(WriterSettings::new());
    writer.visit_header(&class_header("me/Test")).unwrap();
    {
        let mut method = writer
            .visit_method(&static_method("run", "()V"))
            .unwrap()
            .unwrap();
        method.visit_code().unwrap();
        method.visit_insn(RETURN).unwrap();
        method.visit_maxs(0, 0).unwrap();
        assert!(matches!(
            method.visit_insn(NOP),
            Err(Error::CodeAlreadyFinished)
        ));
    }

    // Asking for bytes too early, then too late to add more
    assert!(matches!(writer.to_bytes(), Err(Error::ClassNotFinished)));
    writer.visit_end().unwrap();
    assert!(writer.to_bytes().is_ok());
    assert!(matches!(
        writer.visit_method(&static_method("late", "()V")),
        Err(Error::CodeAlreadyFinished)
    ));
}

/// Error from writing a `run` method whose body is expected to be rejected
fn rejected(body: impl FnOnce(&mut dyn MethodVisitor) -> Result<(), Error>) -> Error {
    match single_method_class(WriterSettings::new(), "()V", body) {
        Err(err) => err,
        Ok(_) => panic!("class was written"),
    }
}

#[test]
fn instruction_arguments_are_checked() {
    // Opcodes passed to a visit for another kind of instruction
    assert!(matches!(
        rejected(|method| method.visit_insn(ILOAD)),
        Error::InvalidOpcode {
            opcode: ILOAD,
            visit: "visit_insn"
        }
    ));
    assert!(matches!(
        rejected(|method| method.visit_int_insn(ILOAD, 1)),
        Error::InvalidOpcode { opcode: ILOAD, .. }
    ));
    assert!(matches!(
        rejected(|method| method.visit_type_insn(GETFIELD, "java/lang/Object")),
        Error::InvalidOpcode { opcode: GETFIELD, .. }
    ));
    assert!(matches!(
        rejected(|method| method.visit_field_insn(NEW, "me/Test", "x", "I")),
        Error::InvalidOpcode { opcode: NEW, .. }
    ));
    assert!(matches!(
        rejected(|method| method.visit_method_insn(GETSTATIC, "me/Test", "f", "()V", false)),
        Error::InvalidOpcode { opcode: GETSTATIC, .. }
    ));
    assert!(matches!(
        rejected(|method| {
            let label = method.new_label();
            method.visit_jump_insn(RETURN, label)
        }),
        Error::InvalidOpcode { opcode: RETURN, .. }
    ));

    // Operands that don't fit the instruction
    assert!(matches!(
        rejected(|method| method.visit_int_insn(BIPUSH, 200)),
        Error::InvalidOperand {
            opcode: BIPUSH,
            operand: 200
        }
    ));
    assert!(matches!(
        rejected(|method| method.visit_int_insn(NEWARRAY, 3)),
        Error::InvalidOperand {
            opcode: NEWARRAY,
            operand: 3
        }
    ));
    assert!(matches!(
        rejected(|method| method.visit_multi_anew_array_insn("[[I", 0)),
        Error::InvalidOperand {
            opcode: MULTIANEWARRAY,
            ..
        }
    ));

    // Switches whose keys and targets don't line up
    assert!(matches!(
        rejected(|method| {
            let default = method.new_label();
            let case = method.new_label();
            method.visit_lookup_switch_insn(default, &[1, 2], &[case])
        }),
        Error::SwitchTargetMismatch {
            keys: 2,
            targets: 1
        }
    ));
    assert!(matches!(
        rejected(|method| {
            let default = method.new_label();
            let case = method.new_label();
            method.visit_lookup_switch_insn(default, &[4, 4], &[case, case])
        }),
        Error::InvalidOperand {
            opcode: LOOKUPSWITCH,
            operand: 4
        }
    ));
    assert!(matches!(
        rejected(|method| {
            let default = method.new_label();
            let case = method.new_label();
            method.visit_table_switch_insn(0, 2, default, &[case, case])
        }),
        Error::SwitchTargetMismatch {
            keys: 3,
            targets: 2
        }
    ));
}

#[test]
fn wide_jumps_start_out_narrow() {
    let bytes = single_method_class(WriterSettings::maxs_only(), "()V", |method| {
        let end = method.new_label();
        method.visit_jump_insn(GOTO_W, end)?;
        method.visit_label(end)?;
        method.visit_insn(RETURN)
    })
    .unwrap();
    assert_eq!(code_of(&bytes, "()V"), vec![GOTO, 0, 3, RETURN]);
}
