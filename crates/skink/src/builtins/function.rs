//! `Function.prototype.call` / `apply` / `bind`.

use crate::{
    ast::Span,
    builtins::NativeFn,
    error::{RunError, RunResult},
    heap::{BoundFunctionObject, ObjectData},
    interp::Interp,
    value::Value,
};

pub(crate) async fn call(interp: &Interp, f: NativeFn, this: Value, args: Vec<Value>, span: Span) -> RunResult<Value> {
    match f {
        NativeFn::FunctionCall => {
            let mut iter = args.into_iter();
            let receiver = iter.next().unwrap_or(Value::Undefined);
            interp.call_value(this, receiver, iter.collect(), span).await
        }
        NativeFn::FunctionApply => {
            let receiver = args.first().cloned().unwrap_or(Value::Undefined);
            let call_args = match args.get(1) {
                Some(Value::Undefined | Value::Null) | None => Vec::new(),
                Some(list) => interp.iter_collect(list, span).await?,
            };
            interp.call_value(this, receiver, call_args, span).await
        }
        NativeFn::FunctionBind => {
            let mut iter = args.into_iter();
            let bound_this = iter.next().unwrap_or(Value::Undefined);
            let partial_args: Vec<Value> = iter.collect();
            let name = {
                let st = interp.st();
                match &this {
                    Value::Ref(id) => match st.heap.get(*id) {
                        ObjectData::Function(func) => func.name.clone(),
                        ObjectData::Class(class) => class.name.clone(),
                        _ => None,
                    },
                    Value::Native(nf) => Some(nf.display_name().into()),
                    _ => None,
                }
            };
            let mut st = interp.st();
            Ok(Value::Ref(st.heap.alloc(ObjectData::BoundFunction(BoundFunctionObject {
                target: this,
                this: bound_this,
                partial_args,
                name,
            }))))
        }
        _ => unreachable!("non-function native routed to function::call"),
    }
}
