use skink::{Engine, HostValue, InterpreterOptions, RunOptions};

fn eval(source: &str) -> HostValue {
    let engine = Engine::new(InterpreterOptions::default());
    engine.evaluate(source, RunOptions::default()).unwrap()
}

fn eval_err(source: &str) -> skink::Error {
    let engine = Engine::new(InterpreterOptions::default());
    engine.evaluate(source, RunOptions::default()).unwrap_err()
}

#[test]
fn methods_getters_and_statics() {
    let source = r"
        class Point {
            constructor(x, y) { this.x = x; this.y = y; }
            get norm() { return this.x * this.x + this.y * this.y; }
            scale(k) { this.x *= k; this.y *= k; return this; }
            static origin() { return new Point(0, 0); }
        }
        const p = new Point(3, 4).scale(2);
        [p.norm, Point.origin().x].join(',')
    ";
    assert_eq!(eval(source), HostValue::String("100,0".to_owned()));
}

#[test]
fn inheritance_and_super_dispatch() {
    let source = r"
        class Animal {
            constructor(name) { this.name = name; }
            speak() { return this.name + ' makes a sound'; }
        }
        class Dog extends Animal {
            constructor(name) { super(name); this.kind = 'dog'; }
            speak() { return super.speak() + ': woof'; }
        }
        const d = new Dog('rex');
        [d.speak(), d.kind, d instanceof Dog, d instanceof Animal].join('|')
    ";
    assert_eq!(
        eval(source),
        HostValue::String("rex makes a sound: woof|dog|true|true".to_owned())
    );
}

#[test]
fn derived_class_without_constructor_forwards_arguments() {
    let source = r"
        class Base { constructor(v) { this.v = v; } }
        class Child extends Base {}
        new Child(41).v + 1
    ";
    assert_eq!(eval(source), HostValue::Number(42.0));
}

#[test]
fn this_before_super_is_a_reference_error() {
    let err = eval_err(
        "class A {} class B extends A { constructor() { this.x = 1; super(); } } new B()",
    );
    assert!(err.message.contains("super"), "{}", err.message);
}

/// Instance fields apply after the base constructor returns and before the
/// derived body runs, in source order.
#[test]
fn field_initializer_ordering() {
    let source = r"
        const order = [];
        class Base { constructor() { order.push('base-ctor'); } }
        class Child extends Base {
            a = order.push('field-a');
            b = order.push('field-b');
            constructor() { super(); order.push('child-body'); }
        }
        new Child();
        order.join(',')
    ";
    assert_eq!(
        eval(source),
        HostValue::String("base-ctor,field-a,field-b,child-body".to_owned())
    );
}

/// Static fields and static blocks interleave strictly in source order.
#[test]
fn static_members_initialize_in_source_order() {
    let source = r"
        const order = [];
        class C {
            static a = order.push('a');
            static { order.push('block-1'); }
            static b = order.push('b');
            static { order.push('block-2'); }
        }
        order.join(',')
    ";
    assert_eq!(eval(source), HostValue::String("a,block-1,b,block-2".to_owned()));
}

#[test]
fn private_fields_and_methods() {
    let source = r"
        class Counter {
            #count = 0;
            #step() { return 1; }
            increment() { this.#count += this.#step(); return this.#count; }
            get value() { return this.#count; }
        }
        const c = new Counter();
        c.increment(); c.increment();
        c.value
    ";
    assert_eq!(eval(source), HostValue::Number(2.0));
}

/// The brand check fires at the access site when the receiver was not
/// constructed by the declaring class.
#[test]
fn private_access_requires_the_brand() {
    let err = eval_err(
        "class A { #x = 1; static read(obj) { return obj.#x; } } A.read({})",
    );
    assert_eq!(err.code, skink::codes::RUNTIME_TYPE);
    assert!(err.message.contains("private member"), "{}", err.message);
}

#[test]
fn brand_test_with_private_in() {
    let source = r"
        class A {
            #x = 1;
            static has(obj) { return #x in obj; }
        }
        [A.has(new A()), A.has({})].join(',')
    ";
    assert_eq!(eval(source), HostValue::String("true,false".to_owned()));
}

#[test]
fn static_private_state() {
    let source = r"
        class Registry {
            static #entries = 0;
            static add() { Registry.#entries += 1; return Registry.#entries; }
        }
        Registry.add();
        Registry.add()
    ";
    assert_eq!(eval(source), HostValue::Number(2.0));
}

/// `constructor` is the one legal spelling for the constructor; the
/// forbidden-name check is path-sensitive and still blocks `__proto__`.
#[test]
fn method_name_validation_is_path_sensitive() {
    assert_eq!(
        eval("class A { constructor() { this.ok = true; } } new A().ok"),
        HostValue::Bool(true)
    );
    let err = eval_err("class A { ['__proto__']() {} }");
    assert_eq!(err.category, skink::ErrorCategory::Security);
}

#[test]
fn base_constructor_may_replace_this() {
    let source = r"
        class Weird { constructor() { return { replaced: true }; } }
        new Weird().replaced
    ";
    assert_eq!(eval(source), HostValue::Bool(true));
}

#[test]
fn class_expressions_and_self_reference() {
    let source = r"
        const C = class Named {
            static describe() { return typeof Named; }
        };
        C.describe()
    ";
    assert_eq!(eval(source), HostValue::String("function".to_owned()));
}

#[test]
fn accessors_on_classes() {
    let source = r"
        class Temp {
            #celsius = 0;
            get f() { return this.#celsius * 9 / 5 + 32; }
            set f(v) { this.#celsius = (v - 32) * 5 / 9; }
        }
        const t = new Temp();
        t.f = 212;
        t.f
    ";
    assert_eq!(eval(source), HostValue::Number(212.0));
}

#[test]
fn static_inheritance_through_the_class_chain() {
    let source = r"
        class Base { static kind() { return 'base'; } }
        class Child extends Base {}
        Child.kind()
    ";
    assert_eq!(eval(source), HostValue::String("base".to_owned()));
    // The static chain is observable through getPrototypeOf.
    assert_eq!(
        eval("class A {} class B extends A {} Object.getPrototypeOf(B) === A"),
        HostValue::Bool(true)
    );
    assert_eq!(
        eval("class A {} Object.getPrototypeOf(A) !== null"),
        HostValue::Bool(true)
    );
}

#[test]
fn calling_a_class_without_new_fails() {
    let err = eval_err("class A {} A()");
    assert!(err.message.contains("without 'new'"), "{}", err.message);
}
