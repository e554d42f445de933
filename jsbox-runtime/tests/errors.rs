mod test_helpers;

use jsbox_runtime::{Error, ErrorKind, Severity, Val, INTERRUPTED_ERROR_NAME};
use test_helpers::{new_instance, test_nonex};

fn eval_err(code: &str) -> Error {
    let mut inst = new_instance();
    match inst.eval(code) {
        Err(e) => e,
        Ok(v) => panic!("`{}` evaluated to {:?} instead of failing", code, v),
    }
}

#[test]
fn native_error_kinds() {
    test_nonex(|| {
        let cases = [
            ("let = ;", ErrorKind::Syntax, "SyntaxError"),
            ("null.property", ErrorKind::Type, "TypeError"),
            ("notDefinedAnywhere + 1", ErrorKind::Reference, "ReferenceError"),
            ("new Array(-1)", ErrorKind::Range, "RangeError"),
            ("throw new EvalError('eval')", ErrorKind::Eval, "EvalError"),
            ("decodeURIComponent('%')", ErrorKind::Uri, "URIError"),
            (
                "throw new AggregateError([], 'several')",
                ErrorKind::Aggregate,
                "AggregateError",
            ),
        ];
        for &(code, kind, name) in cases.iter() {
            let err = eval_err(code);
            assert_eq!(err.kind(), kind, "{}: {:?}", code, err);
            assert_eq!(err.js_name(), Some(name), "{}", code);
        }
    })
}

#[test]
fn guest_messages_pass_through() {
    test_nonex(|| {
        match eval_err("throw new RangeError('out of range')") {
            Error::Range(details) => {
                assert_eq!(details.message, "out of range");
                assert!(details.stack.is_some());
            }
            e => panic!("unexpected error: {:?}", e),
        }
        assert_eq!(
            eval_err("throw new EvalError('eval')").to_string(),
            "eval"
        );
    })
}

#[test]
fn other_error_classes_are_runtime_errors() {
    test_nonex(|| {
        match eval_err("throw new Error('plain')") {
            Error::Runtime(details) => {
                assert_eq!(details.message, "plain");
                assert_eq!(details.js_name.as_deref(), Some("Error"));
            }
            e => panic!("unexpected error: {:?}", e),
        }

        let custom = r#"
            class DomainError extends Error {
                constructor(message) {
                    super(message);
                    this.name = 'DomainError';
                }
            }
            throw new DomainError('custom class');
        "#;
        match eval_err(custom) {
            Error::Runtime(details) => {
                assert_eq!(details.message, "custom class");
                assert_eq!(details.js_name.as_deref(), Some("DomainError"));
            }
            e => panic!("unexpected error: {:?}", e),
        }
    })
}

#[test]
fn thrown_non_errors_are_rendered() {
    test_nonex(|| {
        let cases = [
            ("throw 42", "42"),
            ("throw 'just text'", "just text"),
            ("throw { a: 1 }", "[object Object]"),
            ("throw null", "null"),
        ];
        for &(code, rendered) in cases.iter() {
            match eval_err(code) {
                Error::Runtime(details) => {
                    assert_eq!(details.message, rendered);
                    assert_eq!(details.js_name, None);
                }
                e => panic!("unexpected error for {}: {:?}", code, e),
            }
        }
    })
}

#[test]
fn interrupted_marker_keeps_its_message() {
    test_nonex(|| {
        let code = format!(
            "const e = new Error('stopped by the host'); e.name = '{}'; throw e;",
            INTERRUPTED_ERROR_NAME
        );
        match eval_err(&code) {
            Error::Interrupted(details) => assert_eq!(details.message, "stopped by the host"),
            e => panic!("unexpected error: {:?}", e),
        }
    })
}

#[test]
fn uncaught_errors_are_logged() {
    test_nonex(|| {
        let mut inst = new_instance();
        assert!(inst.eval("throw new TypeError('boom')").is_err());
        assert!(inst.eval("throw 'bare'").is_err());

        let logs = inst.logs();
        assert_eq!(logs.len(), 2);
        assert!(logs.iter().all(|r| r.severity() == Severity::Error));
        assert!(
            logs[0].to_string().starts_with("Uncaught TypeError: boom\n"),
            "{}",
            logs[0]
        );
        assert_eq!(logs[1].to_string(), "Uncaught 'bare'");
    })
}

#[test]
fn caught_errors_are_not_logged() {
    test_nonex(|| {
        let mut inst = new_instance();
        let val = inst
            .eval("try { null.x } catch (e) { e.name }")
            .unwrap();
        assert_eq!(val, Val::from("TypeError"));
        assert!(inst.logs().is_empty());
    })
}

#[test]
fn rejections_at_top_level() {
    test_nonex(|| {
        match eval_err("await Promise.reject(new RangeError('rejected'))") {
            Error::Range(details) => assert_eq!(details.message, "rejected"),
            e => panic!("unexpected error: {:?}", e),
        }
        match eval_err("await Promise.reject('why')") {
            Error::Runtime(details) => assert_eq!(details.message, "why"),
            e => panic!("unexpected error: {:?}", e),
        }
        match eval_err("await (async () => { await null; throw new SyntaxError('late'); })()") {
            Error::Syntax(details) => assert_eq!(details.message, "late"),
            e => panic!("unexpected error: {:?}", e),
        }
    })
}

#[test]
fn never_settling_evaluation_is_no_await() {
    test_nonex(|| match eval_err("await new Promise(() => {})") {
        Error::NoAwait => (),
        e => panic!("unexpected error: {:?}", e),
    })
}

#[test]
fn failures_leave_the_instance_usable() {
    test_nonex(|| {
        let mut inst = new_instance();
        inst.eval("var kept = 'still here';").unwrap();
        assert!(inst.eval("throw new Error('x')").is_err());
        assert!(inst.eval("syntax error here").is_err());
        assert_eq!(inst.eval("kept").unwrap(), Val::from("still here"));
    })
}
