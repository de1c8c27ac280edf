//! Shared module fixtures.

use umbra_core::{
    BinaryOp, CmpPred, Function, GlobalVariable, Initializer, Linkage, Module, Signature, Value,
};

/// A module exercising every pass: a C-string global, straight-line
/// arithmetic, a five-block diamond, and a three-block counting loop.
pub fn sample_program() -> Module {
    let mut module = Module::new("sample");
    let i32_ty = module.types.int(32);
    let i8_ty = module.types.int(8);
    let ptr_ty = module.types.ptr();

    let arr = module.types.array(i8_ty, 6);
    let greeting = module.add_global(GlobalVariable {
        name: "greeting".into(),
        ty: arr,
        is_constant: true,
        linkage: Linkage::Private,
        init: Some(Initializer::Bytes(b"Hello\0".to_vec())),
    });

    // int add(int a, int b) { return a + b; }
    let add = module.add_function(Function::new(
        "add",
        Signature {
            ret: i32_ty,
            params: vec![i32_ty, i32_ty],
        },
        Linkage::External,
    ));
    let mut b = module.builder(add);
    let sum = b.binary(BinaryOp::Add, i32_ty, Value::Param(0), Value::Param(1));
    b.ret(Some(sum));

    // int classify(int x) { return x > 0 ? 2 * x : -x; } as a diamond
    let classify = module.add_function(Function::new(
        "classify",
        Signature {
            ret: i32_ty,
            params: vec![i32_ty],
        },
        Linkage::External,
    ));
    let mut b = module.builder(classify);
    let check = b.block("check");
    let double = b.block("double");
    let negate = b.block("negate");
    let join = b.block("join");
    let slot = b.alloca(i32_ty, None);
    b.br(check);
    b.switch_to(check);
    let positive = b.icmp(CmpPred::Sgt, Value::Param(0), Value::const_int(i32_ty, 0));
    b.cond_br(positive, double, negate);
    b.switch_to(double);
    let doubled = b.binary(BinaryOp::Add, i32_ty, Value::Param(0), Value::Param(0));
    b.store(doubled, slot);
    b.br(join);
    b.switch_to(negate);
    let negated = b.binary(
        BinaryOp::Sub,
        i32_ty,
        Value::const_int(i32_ty, 0),
        Value::Param(0),
    );
    b.store(negated, slot);
    b.br(join);
    b.switch_to(join);
    let out = b.load(i32_ty, slot);
    b.ret(Some(out));

    // int triangle(int n) { int s = 0; while (n > 0) s += n--; return s; }
    let triangle = module.add_function(Function::new(
        "triangle",
        Signature {
            ret: i32_ty,
            params: vec![i32_ty],
        },
        Linkage::External,
    ));
    let mut b = module.builder(triangle);
    let header = b.block("header");
    let body = b.block("body");
    let done = b.block("done");
    let sum_slot = b.alloca(i32_ty, None);
    let n_slot = b.alloca(i32_ty, None);
    b.store(Value::const_int(i32_ty, 0), sum_slot);
    b.store(Value::Param(0), n_slot);
    b.br(header);
    b.switch_to(header);
    let n = b.load(i32_ty, n_slot);
    let more = b.icmp(CmpPred::Sgt, n, Value::const_int(i32_ty, 0));
    b.cond_br(more, body, done);
    b.switch_to(body);
    let n = b.load(i32_ty, n_slot);
    let sum = b.load(i32_ty, sum_slot);
    let sum = b.binary(BinaryOp::Add, i32_ty, sum, n);
    b.store(sum, sum_slot);
    let next = b.binary(BinaryOp::Sub, i32_ty, n, Value::const_int(i32_ty, 1));
    b.store(next, n_slot);
    b.br(header);
    b.switch_to(done);
    let sum = b.load(i32_ty, sum_slot);
    b.ret(Some(sum));

    // char *greeting_ptr(void) { return greeting; }
    let greeting_ptr = module.add_function(Function::new(
        "greeting_ptr",
        Signature {
            ret: ptr_ty,
            params: vec![],
        },
        Linkage::External,
    ));
    let mut b = module.builder(greeting_ptr);
    b.ret(Some(Value::Global(greeting)));

    umbra_core::verify_module(&module).expect("fixture must be well-formed");
    module
}

/// A module whose one function is a long chain of blocks, for exercising
/// the optimizer on a CFG of meaningful size.
pub fn chain_program(blocks: usize) -> Module {
    let mut module = Module::new("chain");
    let i32_ty = module.types.int(32);
    let func = module.add_function(Function::new(
        "walk",
        Signature {
            ret: i32_ty,
            params: vec![i32_ty],
        },
        Linkage::External,
    ));
    let mut b = module.builder(func);
    let slot = b.alloca(i32_ty, None);
    b.store(Value::Param(0), slot);
    let links: Vec<_> = (0..blocks)
        .map(|i| b.block(format!("link{i}")))
        .collect();
    b.br(links[0]);
    for (i, &link) in links.iter().enumerate() {
        b.switch_to(link);
        let v = b.load(i32_ty, slot);
        let v = b.binary(BinaryOp::Add, i32_ty, v, Value::const_int(i32_ty, 1));
        b.store(v, slot);
        if i + 1 < links.len() {
            b.br(links[i + 1]);
        } else {
            let out = b.load(i32_ty, slot);
            b.ret(Some(out));
        }
    }
    umbra_core::verify_module(&module).expect("fixture must be well-formed");
    module
}
