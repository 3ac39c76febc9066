use crate::host::{CallOperands, Instruction, MediumLevelFunction, Operation, PossibleValue};
use crate::il::{BinaryImage, Function};
use crate::lifter::{lift_from, LiftedBinary};

#[cfg(test)]
use crate::config::FixerConfig;
#[cfg(test)]
use crate::host::BinaryView;
#[cfg(test)]
use crate::pass::{FunctionReport, PrintkFixer};
#[cfg(test)]
use crate::symbol_cache::TargetAddress;

/// A small kernel module with a handful of `printk` calls, in `.mlil-exported` format
pub const HELLO_MODULE_EXPORT: &str = include_str!("../tests/hello-module.mlil-exported");

pub const PRINTK_ADDR: u64 = 0x1000;
pub const FMT_ADDR: u64 = 0x8000;
pub const CALL_ADDR: u64 = 0x2004;

/// A function with a single call to `printk` (at [`PRINTK_ADDR`]) at [`CALL_ADDR`], whose
/// arguments are `params`.
pub fn single_call_function(params: &[PossibleValue]) -> Function {
    let mut f = Function::new("init_module", 0x2000);
    let dest = f.add_expr(8, PossibleValue::ConstantPointer(PRINTK_ADDR));
    let params = params.iter().map(|&p| f.add_expr(8, p)).collect();
    f.add_basic_block(vec![
        Instruction {
            address: 0x2000,
            operation: Operation::Other,
        },
        Instruction {
            address: CALL_ADDR,
            operation: Operation::Call(CallOperands { dest, params }),
        },
    ])
    .unwrap();
    f
}

/// A binary with `printk` at [`PRINTK_ADDR`] and `fmt` mapped at [`FMT_ADDR`], along with a
/// [`single_call_function`].
pub fn single_call_module(fmt: &[u8], params: &[PossibleValue]) -> (BinaryImage, Function) {
    let mut image = BinaryImage::new("single.ko");
    image.add_symbol("printk", PRINTK_ADDR);
    image.map_bytes(FMT_ADDR, fmt.to_vec()).unwrap();
    (image, single_call_function(params))
}

/// The value of the first argument of the call at `addr`
pub fn format_string_at(f: &Function, addr: u64) -> Option<PossibleValue> {
    let ins = f.instructions.iter().find(|ins| ins.address == addr)?;
    let (_kind, ops) = ins.operation.as_call()?;
    ops.params.first().map(|&p| f.expr_value(p))
}

pub fn hello_module() -> LiftedBinary {
    lift_from(HELLO_MODULE_EXPORT).unwrap()
}

#[test]
fn header_is_stripped_and_level_noted() {
    let (image, mut f) =
        single_call_module(b"\x014oops\n\0", &[PossibleValue::ConstantPointer(FMT_ADDR)]);
    let fixer = PrintkFixer::default();

    let report = fixer.run_on_function(&image, &mut f);

    assert_eq!(
        report,
        FunctionReport {
            calls_found: 1,
            calls_rewritten: 1,
            comments_added: 1,
        }
    );
    assert_eq!(
        format_string_at(&f, CALL_ADDR),
        Some(PossibleValue::ConstantPointer(FMT_ADDR + 2))
    );
    assert_eq!(
        f.comment_at(CALL_ADDR).as_deref(),
        Some("Log level: KERN_WARNING")
    );
    assert_eq!(f.ssa_generations(), 1);
}

#[test]
fn plain_integer_format_string_is_rewritten_to_a_pointer() {
    let (image, mut f) = single_call_module(b"\x013bad\n\0", &[PossibleValue::Constant(FMT_ADDR)]);
    let report = PrintkFixer::default().run_on_function(&image, &mut f);
    assert!(report.modified());
    assert_eq!(
        format_string_at(&f, CALL_ADDR),
        Some(PossibleValue::ConstantPointer(FMT_ADDR + 2))
    );
}

#[test]
fn repeated_headers_are_all_stripped_first_level_wins() {
    let (image, mut f) = single_call_module(
        b"\x01c\x016both\n\0",
        &[PossibleValue::ConstantPointer(FMT_ADDR)],
    );
    PrintkFixer::default().run_on_function(&image, &mut f);
    assert_eq!(
        format_string_at(&f, CALL_ADDR),
        Some(PossibleValue::ConstantPointer(FMT_ADDR + 4))
    );
    assert_eq!(
        f.comment_at(CALL_ADDR).as_deref(),
        Some("Log level: KERN_CONT")
    );
}

#[test]
fn nul_level_alone_is_not_a_header() {
    let (image, mut f) =
        single_call_module(b"\x01\x00hi\n\0", &[PossibleValue::ConstantPointer(FMT_ADDR)]);

    let report = PrintkFixer::default().run_on_function(&image, &mut f);

    assert_eq!(report.calls_found, 1);
    assert!(!report.modified());
    assert_eq!(
        format_string_at(&f, CALL_ADDR),
        Some(PossibleValue::ConstantPointer(FMT_ADDR))
    );
    assert_eq!(f.comment_at(CALL_ADDR), None);
    assert_eq!(f.ssa_generations(), 0);
}

#[test]
fn nul_level_defers_to_a_later_unit() {
    let (image, mut f) = single_call_module(
        b"\x01\x00\x016hi\n\0",
        &[PossibleValue::ConstantPointer(FMT_ADDR)],
    );

    let report = PrintkFixer::default().run_on_function(&image, &mut f);

    assert_eq!(
        report,
        FunctionReport {
            calls_found: 1,
            calls_rewritten: 1,
            comments_added: 1,
        }
    );
    assert_eq!(
        format_string_at(&f, CALL_ADDR),
        Some(PossibleValue::ConstantPointer(FMT_ADDR + 4))
    );
    assert_eq!(
        f.comment_at(CALL_ADDR).as_deref(),
        Some("Log level: KERN_INFO")
    );
    assert_eq!(f.ssa_generations(), 1);
}

#[test]
fn calls_that_cannot_be_understood_are_left_alone() {
    for params in [
        vec![],
        vec![PossibleValue::Undetermined],
        vec![PossibleValue::ExternalPointer(FMT_ADDR)],
    ] {
        let (image, mut f) = single_call_module(b"\x014oops\n\0", &params);
        let before = f.expressions.clone();

        let report = PrintkFixer::default().run_on_function(&image, &mut f);

        assert_eq!(report.calls_found, 1, "{:?}", params);
        assert!(!report.modified(), "{:?}", params);
        assert_eq!(f.expressions, before);
        assert!(f.comments.is_empty());
        assert_eq!(f.ssa_generations(), 0);
    }
}

#[test]
fn format_string_without_header_is_untouched() {
    let (image, mut f) =
        single_call_module(b"no level\n\0", &[PossibleValue::ConstantPointer(FMT_ADDR)]);
    let report = PrintkFixer::default().run_on_function(&image, &mut f);
    assert_eq!(report.calls_found, 1);
    assert!(!report.modified());
    assert_eq!(
        format_string_at(&f, CALL_ADDR),
        Some(PossibleValue::ConstantPointer(FMT_ADDR))
    );
    assert_eq!(f.ssa_generations(), 0);
}

#[test]
fn unmapped_format_string_is_untouched() {
    let (image, mut f) =
        single_call_module(b"\x014oops\n\0", &[PossibleValue::ConstantPointer(0xdead_0000)]);
    let report = PrintkFixer::default().run_on_function(&image, &mut f);
    assert!(!report.modified());
    assert_eq!(f.ssa_generations(), 0);
}

#[test]
fn existing_comments_are_not_overwritten() {
    let (image, mut f) =
        single_call_module(b"\x012crit\n\0", &[PossibleValue::ConstantPointer(FMT_ADDR)]);
    f.set_comment_at(CALL_ADDR, "see errata".into());

    let report = PrintkFixer::default().run_on_function(&image, &mut f);

    assert_eq!(report.calls_rewritten, 1);
    assert_eq!(report.comments_added, 0);
    assert_eq!(f.comment_at(CALL_ADDR).as_deref(), Some("see errata"));
}

#[test]
fn log_level_comments_can_be_disabled() {
    let (image, mut f) =
        single_call_module(b"\x012crit\n\0", &[PossibleValue::ConstantPointer(FMT_ADDR)]);
    let fixer = PrintkFixer::new(FixerConfig {
        annotate_log_levels: false,
        ..Default::default()
    });

    let report = fixer.run_on_function(&image, &mut f);

    assert_eq!(report.calls_rewritten, 1);
    assert_eq!(f.comment_at(CALL_ADDR), None);
}

#[test]
fn binary_without_printk_is_a_no_op() {
    let mut image = BinaryImage::new("not-a-module");
    image.map_bytes(FMT_ADDR, b"\x014oops\n\0".to_vec()).unwrap();
    let mut f = single_call_function(&[PossibleValue::ConstantPointer(FMT_ADDR)]);
    let fixer = PrintkFixer::default();

    for _ in 0..3 {
        assert_eq!(
            fixer.run_on_function(&image, &mut f),
            FunctionReport::default()
        );
    }
    assert_eq!(
        fixer.targets().lookup(image.session_id()),
        Some(TargetAddress::NOT_FOUND)
    );
    assert_eq!(f.ssa_generations(), 0);
}

#[test]
fn indexed_printk_is_found_unless_disabled() {
    let mut image = BinaryImage::new("indexed.ko");
    image.add_symbol("_printk", PRINTK_ADDR);
    image.map_bytes(FMT_ADDR, b"\x015note\n\0".to_vec()).unwrap();

    let mut f = single_call_function(&[PossibleValue::ConstantPointer(FMT_ADDR)]);
    assert!(PrintkFixer::default()
        .run_on_function(&image, &mut f)
        .modified());
    assert_eq!(
        f.comment_at(CALL_ADDR).as_deref(),
        Some("Log level: KERN_NOTICE")
    );

    let mut f = single_call_function(&[PossibleValue::ConstantPointer(FMT_ADDR)]);
    let fixer = PrintkFixer::new(FixerConfig::from(vec![
        crate::config::CommandLineFixerConfig::DisableIndexedPrintkFallback,
    ]));
    assert_eq!(
        fixer.run_on_function(&image, &mut f),
        FunctionReport::default()
    );
}

#[test]
fn hello_module_is_fixed() {
    let LiftedBinary {
        image,
        mut functions,
    } = hello_module();
    let fixer = PrintkFixer::default();

    let reports: Vec<FunctionReport> = functions
        .iter_mut()
        .map(|f| fixer.run_on_function(&image, f))
        .collect();

    let by_name = |name: &str| {
        let i = functions.iter().position(|f| f.name == name).unwrap();
        (&functions[i], reports[i])
    };

    let (init, report) = by_name("init_module");
    assert_eq!(
        report,
        FunctionReport {
            calls_found: 2,
            calls_rewritten: 1,
            comments_added: 1,
        }
    );
    assert_eq!(
        format_string_at(init, 0x4),
        Some(PossibleValue::ConstantPointer(0x2002))
    );
    assert_eq!(
        format_string_at(init, 0xc),
        Some(PossibleValue::ConstantPointer(0x2028))
    );
    assert_eq!(init.comment_at(0x4).as_deref(), Some("Log level: KERN_INFO"));
    assert_eq!(init.comment_at(0xc), None);
    assert_eq!(init.ssa_generations(), 1);

    let (cleanup, report) = by_name("cleanup_module");
    assert_eq!(report.calls_rewritten, 1);
    assert_eq!(
        format_string_at(cleanup, 0x44),
        Some(PossibleValue::ConstantPointer(0x2012))
    );
    assert_eq!(
        cleanup.comment_at(0x44).as_deref(),
        Some("Log level: KERN_WARNING")
    );

    let (log_state, report) = by_name("hello_log_state");
    assert_eq!(
        report,
        FunctionReport {
            calls_found: 2,
            calls_rewritten: 1,
            comments_added: 0,
        }
    );
    assert_eq!(format_string_at(log_state, 0x84), Some(PossibleValue::Undetermined));
    assert_eq!(
        format_string_at(log_state, 0x88),
        Some(PossibleValue::ConstantPointer(0x2022))
    );
    assert_eq!(
        format_string_at(log_state, 0x8c),
        Some(PossibleValue::ConstantPointer(0x2000))
    );
    assert_eq!(
        log_state.comment_at(0x88).as_deref(),
        Some("continues the line from 84")
    );

    let (param_set, report) = by_name("hello_param_set");
    assert_eq!(report, FunctionReport::default());
    assert_eq!(param_set.ssa_generations(), 0);

    let written = LiftedBinary { image, functions }.to_string();
    assert!(written.contains("4 CALL ptr:1000/8 ptr:2002/8\n"), "{}", written);
    assert!(written.contains("COMMENT 44 Log level: KERN_WARNING\n"), "{}", written);
}

#[test]
fn functions_fixed_in_parallel_share_one_lookup() {
    use rayon::prelude::*;

    let LiftedBinary {
        image,
        mut functions,
    } = hello_module();
    let fixer = PrintkFixer::default();

    let mut total = FunctionReport::default();
    for r in functions
        .par_iter_mut()
        .map(|f| fixer.run_on_function(&image, f))
        .collect::<Vec<_>>()
    {
        total += r;
    }

    assert_eq!(
        total,
        FunctionReport {
            calls_found: 5,
            calls_rewritten: 3,
            comments_added: 2,
        }
    );
    assert_eq!(
        fixer.targets().lookup(image.session_id()),
        Some(TargetAddress::found(0x1000))
    );
    assert_eq!(
        functions.iter().map(|f| f.ssa_generations()).sum::<usize>(),
        3
    );
}

#[test]
fn one_fixer_serves_many_binaries() {
    let fixer = PrintkFixer::default();
    let mut with = hello_module();
    let (mut without, mut lone) =
        single_call_module(b"\x014oops\n\0", &[PossibleValue::ConstantPointer(FMT_ADDR)]);
    without.symbols.clear();

    assert!(!fixer.run_on_function(&without, &mut lone).modified());
    assert!(fixer
        .run_on_function(&with.image, &mut with.functions[0])
        .modified());
    assert_eq!(
        fixer.targets().lookup(without.session_id()),
        Some(TargetAddress::NOT_FOUND)
    );
}
