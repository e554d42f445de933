mod test_helpers;

use jsbox_runtime::{Error, ImportSpec, Val};
use test_helpers::{new_instance, test_nonex};

const FIXTURE: &str = r#"
export const member = () => "exported member";
export const defaultMember = () => "default export";
export default defaultMember;

const thrower = () => {
  throw new Error("wrapped failure");
};

export const wrapError = () => {
  thrower();
};
"#;

#[test]
fn default_import() {
    test_nonex(|| {
        let mut inst = new_instance();
        assert!(inst.import("Imported", FIXTURE, None).unwrap());
        assert_eq!(inst.eval("Imported()").unwrap(), Val::from("default export"));
    })
}

#[test]
fn namespace_import() {
    test_nonex(|| {
        let mut inst = new_instance();
        assert!(inst.import("* as all", FIXTURE, None).unwrap());
        assert_eq!(inst.eval("all.member()").unwrap(), Val::from("exported member"));
        assert_eq!(inst.eval("all.default()").unwrap(), Val::from("default export"));
    })
}

#[test]
fn named_imports() {
    test_nonex(|| {
        let mut inst = new_instance();
        assert!(inst
            .import(vec!["member", "defaultMember"], FIXTURE, None)
            .unwrap());
        assert_eq!(
            inst.eval("[member(), defaultMember()]").unwrap(),
            Val::from(vec!["exported member", "default export"])
        );
    })
}

#[test]
fn aliased_imports() {
    test_nonex(|| {
        let mut inst = new_instance();
        let spec = ImportSpec::aliased(vec![
            ("default", "aliasedDefault"),
            ("member", "aliasedMember"),
        ]);
        assert!(inst.import(spec, FIXTURE, None).unwrap());
        assert_eq!(
            inst.eval("[aliasedDefault(), aliasedMember()]").unwrap(),
            Val::from(vec!["default export", "exported member"])
        );
        assert_eq!(inst.eval("typeof member").unwrap(), Val::from("undefined"));
    })
}

#[test]
fn custom_exposure() {
    test_nonex(|| {
        let mut inst = new_instance();
        assert!(inst
            .import(
                "* as all",
                FIXTURE,
                Some("globalThis.exposed = { m: all.member };")
            )
            .unwrap());
        assert_eq!(inst.eval("exposed.m()").unwrap(), Val::from("exported member"));
        assert_eq!(inst.eval("typeof all").unwrap(), Val::from("undefined"));
    })
}

#[test]
fn errors_from_imported_code() {
    test_nonex(|| {
        let mut inst = new_instance();
        inst.import(vec!["wrapError"], FIXTURE, None).unwrap();
        match inst.eval("wrapError()") {
            Err(Error::Runtime(details)) => assert_eq!(details.message, "wrapped failure"),
            res => panic!("unexpected result: {:?}", res),
        }
    })
}

#[test]
fn importing_twice() {
    test_nonex(|| {
        let mut inst = new_instance();
        inst.import("first", FIXTURE, None).unwrap();
        inst.import("second", FIXTURE, None).unwrap();
        assert_eq!(
            inst.eval("first() === second()").unwrap(),
            Val::Bool(true)
        );
    })
}

#[test]
fn missing_source() {
    test_nonex(|| {
        let mut inst = new_instance();
        match inst.import("Imported", "", None) {
            Err(Error::Runtime(details)) => assert_eq!(details.message, "missing import source"),
            res => panic!("unexpected result: {:?}", res),
        }
    })
}

#[test]
fn malformed_modules() {
    test_nonex(|| {
        let mut inst = new_instance();
        match inst.import("broken", "export const = ;", None) {
            Err(Error::Syntax(_)) => (),
            res => panic!("unexpected result: {:?}", res),
        }
        match inst.import(vec!["notExported"], FIXTURE, None) {
            Err(Error::Syntax(_)) => (),
            res => panic!("unexpected result: {:?}", res),
        }
    })
}

#[test]
fn module_evaluation_failure() {
    test_nonex(|| {
        let mut inst = new_instance();
        match inst.import("* as failing", "throw new RangeError('at load');", None) {
            Err(Error::Range(details)) => assert_eq!(details.message, "at load"),
            res => panic!("unexpected result: {:?}", res),
        }
    })
}

#[test]
fn modules_with_top_level_await() {
    test_nonex(|| {
        let mut inst = new_instance();
        let source = "export const answer = await Promise.resolve(42);";
        inst.import(vec!["answer"], source, None).unwrap();
        assert_eq!(inst.eval("answer").unwrap(), Val::Int(42));
    })
}
