//! Whole-pipeline semantic equivalence.
//!
//! Runs every pass in sequence over the sample program and checks, via
//! the reference interpreter, that the externally visible functions still
//! compute what they computed before.

use crate::fixtures::sample_program;
use umbra_core::interp::Interpreter;
use umbra_transforms::pipeline::run_transforms;
use umbra_transforms::{PassConfig, Transform, ALL_PASSES};

fn all_transforms() -> Vec<Box<dyn Transform>> {
    let config = PassConfig {
        // force every probabilistic site so the test exercises the works
        bogus_ratio: 1.0,
        junk_ratio: 0.5,
        fake_jump_ratio: 0.5,
        ..PassConfig::default()
    };
    ALL_PASSES.iter().map(|k| k.instantiate(&config)).collect()
}

#[test]
fn full_pipeline_preserves_behavior() {
    crate::init_tracing();
    let mut module = sample_program();
    let report = run_transforms(&mut module, &all_transforms(), 0xC0FFEE);
    assert!(report.success);
    assert!(report.modified());
    assert!(report.passes.iter().all(|p| p.error.is_none()), "{report:?}");
    umbra_core::verify_module(&module).unwrap();

    let mut interp = Interpreter::new(&module);
    for (a, b) in [(3i64, 5i64), (-1, 1), (i32::MAX as i64, 1), (250, -250)] {
        assert_eq!(
            interp.call_by_name("add", &[a, b]).unwrap(),
            Some((a as i32).wrapping_add(b as i32) as i64),
            "add({a}, {b})"
        );
    }
    for x in [-9i64, -1, 0, 1, 6, 40] {
        let expected = if x > 0 { 2 * x } else { -x };
        assert_eq!(
            interp.call_by_name("classify", &[x]).unwrap(),
            Some(expected),
            "classify({x})"
        );
    }
    for n in [0i64, 1, 10, 31] {
        assert_eq!(
            interp.call_by_name("triangle", &[n]).unwrap(),
            Some(n * (n + 1) / 2),
            "triangle({n})"
        );
    }
    let addr = interp.call_by_name("greeting_ptr", &[]).unwrap().unwrap();
    assert_eq!(interp.read_c_string(addr), b"Hello");
}

#[test]
fn pipeline_grows_the_module() {
    let mut module = sample_program();
    let report = run_transforms(&mut module, &all_transforms(), 7);
    assert!(report.metrics_after.instructions > report.metrics_before.instructions);
    assert!(report.metrics_after.blocks > report.metrics_before.blocks);
    // the string pass must have synthesized at least one decoder
    assert!(report.metrics_after.functions > report.metrics_before.functions);
}

#[test]
fn pipeline_is_reproducible_for_a_seed() {
    let mut first = sample_program();
    run_transforms(&mut first, &all_transforms(), 99);
    let mut second = sample_program();
    run_transforms(&mut second, &all_transforms(), 99);
    assert_eq!(format!("{first}"), format!("{second}"));
}

#[test]
fn double_encryption_never_happens() {
    let mut module = sample_program();
    let config = PassConfig::default();
    let string_pass = umbra_transforms::PassKind::StringEncryption.instantiate(&config);
    run_transforms(&mut module, &[string_pass], 1);
    let globals_once = module.num_globals();

    let string_pass = umbra_transforms::PassKind::StringEncryption.instantiate(&config);
    let report = run_transforms(&mut module, &[string_pass], 2);
    assert!(!report.modified());
    assert_eq!(module.num_globals(), globals_once);
}
