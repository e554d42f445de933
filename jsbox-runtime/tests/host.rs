mod test_helpers;

use jsbox_runtime::{CallingConvention, Error, HostError, HostPanic, Val, HOST_CLASS_PROPERTY};
use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;
use test_helpers::{new_instance, test_nonex};
use thiserror::Error;

#[derive(Debug, Error)]
#[error("domain failure: {code}")]
struct DomainFailure {
    code: u32,
}

/// Defines `fail()`, which returns a fresh `DomainFailure` each call, and records the last one.
fn define_failing(inst: &mut jsbox_runtime::Instance) -> Rc<RefCell<Option<HostError>>> {
    let raised = Rc::new(RefCell::new(None));
    let slot = raised.clone();
    inst.define_function("fail", move |_, _| {
        let err = HostError::new(DomainFailure { code: 7 });
        *slot.borrow_mut() = Some(err.clone());
        Err(err)
    })
    .unwrap();
    raised
}

#[test]
fn arguments_and_results_are_marshaled() {
    test_nonex(|| {
        let mut inst = new_instance();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        let name = inst
            .define_function("collect", move |_, args| {
                sink.borrow_mut().extend_from_slice(args);
                Ok(Val::from(args.len() as u32))
            })
            .unwrap();
        assert_eq!(name, "collect");

        let count = inst
            .eval("collect(1, 'a', null, undefined, [true], { k: 2.5 })")
            .unwrap();
        assert_eq!(count, Val::Int(6));
        assert_eq!(
            *seen.borrow(),
            vec![
                Val::Int(1),
                Val::from("a"),
                Val::Null,
                Val::Undefined,
                Val::from(vec![true]),
                Val::object(vec![("k", Val::Float(2.5))]),
            ]
        );
    })
}

#[test]
fn host_arithmetic() {
    test_nonex(|| {
        let mut inst = new_instance();
        inst.define_function("add", |_, args| {
            let sum: f64 = args.iter().filter_map(Val::as_f64).sum();
            Ok(Val::from(sum))
        })
        .unwrap();
        assert_eq!(inst.eval("add(1, 2, 3.5)").unwrap(), Val::Float(6.5));
        assert_eq!(inst.eval("add(add(1, 1), 1) * 2").unwrap(), Val::Int(6));
    })
}

#[test]
fn host_errors_keep_their_identity() {
    test_nonex(|| {
        let mut inst = new_instance();
        let raised = define_failing(&mut inst);
        match inst.eval("fail()") {
            Err(Error::Host(err)) => {
                assert!(err.ptr_eq(raised.borrow().as_ref().unwrap()));
                assert_eq!(err.downcast_ref::<DomainFailure>().unwrap().code, 7);
            }
            res => panic!("unexpected result: {:?}", res),
        }
    })
}

#[test]
fn host_errors_are_catchable_guest_errors() {
    test_nonex(|| {
        let mut inst = new_instance();
        define_failing(&mut inst);
        let code = format!(
            "try {{ fail() }} catch (e) {{ [e instanceof Error, e.message, e.{}] }}",
            HOST_CLASS_PROPERTY
        );
        assert_eq!(
            inst.eval(&code).unwrap(),
            Val::from(vec![
                Val::Bool(true),
                Val::from("domain failure: 7"),
                Val::from("DomainFailure"),
            ])
        );
    })
}

#[test]
fn rethrown_later_is_still_the_same_error() {
    test_nonex(|| {
        let mut inst = new_instance();
        let raised = define_failing(&mut inst);
        inst.eval("var saved; try { fail() } catch (e) { saved = e } null")
            .unwrap();
        match inst.eval("throw saved") {
            Err(Error::Host(err)) => assert!(err.ptr_eq(raised.borrow().as_ref().unwrap())),
            res => panic!("unexpected result: {:?}", res),
        }
    })
}

#[test]
fn identity_keys_cannot_be_moved_to_other_errors() {
    test_nonex(|| {
        let mut inst = new_instance();
        let raised = define_failing(&mut inst);
        let code = format!(
            "var saved; try {{ fail() }} catch (e) {{ saved = e }} \
             const d = Object.getOwnPropertyDescriptor(saved, '{key}'); \
             [d.writable, d.enumerable, d.configurable, Object.keys(saved).includes('{key}')]",
            key = jsbox_runtime::IDENTITY_KEY_PROPERTY
        );
        assert_eq!(
            inst.eval(&code).unwrap(),
            Val::from(vec![false, false, false, false])
        );

        let forged = format!(
            "const impostor = new Error('impostor'); \
             Object.defineProperty(impostor, '{key}', {{ value: saved['{key}'] }}); \
             throw impostor",
            key = jsbox_runtime::IDENTITY_KEY_PROPERTY
        );
        match inst.eval(&forged) {
            Err(Error::Runtime(details)) => assert_eq!(details.message, "impostor"),
            res => panic!("unexpected result: {:?}", res),
        }

        match inst.eval("throw saved") {
            Err(Error::Host(err)) => assert!(err.ptr_eq(raised.borrow().as_ref().unwrap())),
            res => panic!("unexpected result: {:?}", res),
        }
    })
}

#[test]
fn caught_error_passed_back_to_the_host() {
    test_nonex(|| {
        let mut inst = new_instance();
        let raised = define_failing(&mut inst);
        let received = Rc::new(RefCell::new(None));
        let slot = received.clone();
        inst.define_function("inspect", move |_, args| {
            *slot.borrow_mut() = args.get(0).and_then(Val::as_error).cloned();
            Ok(Val::Null)
        })
        .unwrap();

        inst.eval("try { fail() } catch (e) { inspect(e) }").unwrap();
        let received = received.borrow();
        assert!(received
            .as_ref()
            .unwrap()
            .ptr_eq(raised.borrow().as_ref().unwrap()));
    })
}

#[test]
fn guest_errors_passed_to_the_host_are_translated() {
    test_nonex(|| {
        let mut inst = new_instance();
        let received = Rc::new(RefCell::new(None));
        let slot = received.clone();
        inst.define_function("inspect", move |_, args| {
            *slot.borrow_mut() = args.get(0).and_then(Val::as_error).cloned();
            Ok(Val::Null)
        })
        .unwrap();

        inst.eval("inspect(new ReferenceError('from the guest'))")
            .unwrap();
        let received = received.borrow();
        match received.as_ref().unwrap().downcast_ref::<Error>() {
            Some(Error::Reference(details)) => assert_eq!(details.message, "from the guest"),
            other => panic!("unexpected error: {:?}", other),
        }
    })
}

#[test]
fn host_functions_can_rethrow_guest_failures() {
    test_nonex(|| {
        let mut inst = new_instance();
        inst.define_function("evalInside", |vmctx, args| {
            let code = args.get(0).and_then(Val::as_str).unwrap_or("");
            Ok(vmctx.eval(code)?)
        })
        .unwrap();

        assert_eq!(inst.eval("evalInside('21 * 2')").unwrap(), Val::Int(42));
        match inst.eval("evalInside('null.x')") {
            Err(Error::Host(err)) => match err.downcast_ref::<Error>() {
                Some(Error::Type(_)) => (),
                other => panic!("unexpected error: {:?}", other),
            },
            res => panic!("unexpected result: {:?}", res),
        }
    })
}

#[test]
fn nested_evaluation_sees_the_same_globals() {
    test_nonex(|| {
        let mut inst = new_instance();
        inst.define_function("double", |vmctx, _| Ok(vmctx.eval("shared * 2")?))
            .unwrap();
        assert_eq!(inst.eval("var shared = 5; double()").unwrap(), Val::Int(10));
    })
}

#[test]
fn vmctx_reports_name_and_budget() {
    test_nonex(|| {
        let mut inst = new_instance();
        inst.define_function("whoami", |vmctx, _| {
            let remaining = vmctx.remaining();
            assert!(remaining <= vmctx.limits().timeout);
            assert!(remaining > Duration::from_millis(0));
            Ok(Val::from(vmctx.function_name()))
        })
        .unwrap();
        assert_eq!(inst.eval("whoami()").unwrap(), Val::from("whoami"));
    })
}

#[test]
fn async_functions_settle_promises() {
    test_nonex(|| {
        let mut inst = new_instance();
        inst.define_async_function("later", |_, args| {
            let n = args.get(0).and_then(Val::as_i64).unwrap_or(0);
            Ok(Val::from(n * 10))
        })
        .unwrap();
        inst.define_function_with("laterFail", CallingConvention::Async, |_, _| {
            Err(HostError::msg("rejected by the host"))
        })
        .unwrap();

        assert_eq!(inst.eval("later(4) instanceof Promise").unwrap(), Val::Bool(true));
        assert_eq!(inst.eval("await later(4)").unwrap(), Val::Int(40));
        assert_eq!(
            inst.eval("try { await laterFail() } catch (e) { e.message }")
                .unwrap(),
            Val::from("rejected by the host")
        );
        assert!(matches!(inst.eval("await laterFail()"), Err(Error::Host(_))));
    })
}

#[test]
fn async_results_the_guest_cannot_hold_reject() {
    test_nonex(|| {
        // the nested result is built and serialized recursively on the host
        let worker = std::thread::Builder::new()
            .stack_size(64 * 1024 * 1024)
            .spawn(|| {
                let mut inst = new_instance();
                inst.define_async_function("deep", |_, _| {
                    let mut v = Val::from(vec![1]);
                    for _ in 0..20_000 {
                        v = Val::from(vec![v]);
                    }
                    Ok(v)
                })
                .unwrap();
                let outcome = inst
                    .eval(
                        "let outcome; \
                         try { \
                             const pending = deep(); \
                             try { await pending; outcome = 'fulfilled'; } \
                             catch (e) { outcome = 'rejected ' + e.name; } \
                         } catch (e) { outcome = 'thrown ' + e.name; } \
                         outcome",
                    )
                    .unwrap();
                assert_eq!(outcome, Val::from("rejected SyntaxError"));
            })
            .unwrap();
        worker.join().unwrap();
    })
}

#[test]
fn unawaited_async_result_is_no_await() {
    test_nonex(|| {
        let mut inst = new_instance();
        inst.define_async_function("later", |_, _| Ok(Val::Int(1)))
            .unwrap();
        match inst.eval("later()") {
            Err(Error::NoAwait) => (),
            res => panic!("unexpected result: {:?}", res),
        }
    })
}

#[test]
fn promises_cannot_be_passed_to_the_host() {
    test_nonex(|| {
        let mut inst = new_instance();
        inst.define_function("echo", |_, args| Ok(args.get(0).cloned().unwrap_or(Val::Undefined)))
            .unwrap();
        match inst.eval("echo(Promise.resolve(1))") {
            Err(Error::Host(err)) => match err.downcast_ref::<Error>() {
                Some(Error::AsyncValue) => (),
                other => panic!("unexpected error: {:?}", other),
            },
            res => panic!("unexpected result: {:?}", res),
        }
    })
}

#[test]
fn invalid_names_are_rejected() {
    test_nonex(|| {
        let mut inst = new_instance();
        for name in &["", "two words", "1st", "a-b", "return"] {
            match inst.define_function(name, |_, _| Ok(Val::Null)) {
                Err(Error::InvalidName(n)) => assert_eq!(n, *name),
                res => panic!("unexpected result: {:?}", res),
            }
        }
    })
}

#[test]
fn redefining_replaces_the_function() {
    test_nonex(|| {
        let mut inst = new_instance();
        inst.define_function("version", |_, _| Ok(Val::Int(1)))
            .unwrap();
        assert_eq!(inst.eval("version()").unwrap(), Val::Int(1));
        inst.define_function("version", |_, _| Ok(Val::Int(2)))
            .unwrap();
        assert_eq!(inst.eval("version()").unwrap(), Val::Int(2));
    })
}

#[test]
fn panics_are_caught_at_the_bridge() {
    test_nonex(|| {
        let mut inst = new_instance();
        inst.define_function("explode", |_, _| panic!("host function blew up"))
            .unwrap();
        match inst.eval("explode()") {
            Err(Error::Host(err)) => {
                let panic = err.downcast_ref::<HostPanic>().unwrap();
                assert_eq!(panic.function, "explode");
                assert_eq!(panic.message, "host function blew up");
            }
            res => panic!("unexpected result: {:?}", res),
        }
        assert_eq!(inst.eval("1 + 1").unwrap(), Val::Int(2));
    })
}
