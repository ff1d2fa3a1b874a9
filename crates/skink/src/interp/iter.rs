//! Iterator protocol: `for..of`, spread, destructuring, `for await..of`.
//!
//! Internal arrays, strings, and generator handles get fast-path native
//! iterators; everything else goes through the well-known-symbol protocol
//! (`[Symbol.iterator]().next()` records). Early exits close the iterator by
//! invoking `return()` exactly once when it exists.

use crate::{
    ast::Span,
    bridge::describe_value,
    builtins::NativeFn,
    error::{RunError, RunResult},
    heap::{HeapId, NativeIterator, ObjectData, PropKey},
    host::HostValue,
    interp::{Interp, coroutine::ResumeMode},
    value::{SYMBOL_ASYNC_ITERATOR, SYMBOL_ITERATOR, Value},
};

/// A live iteration: the iterator object plus its `next` method.
pub(crate) struct IterHandle {
    pub iterator: Value,
    next: Value,
    /// Async protocol: `next()` results are promises the caller awaits.
    pub is_async: bool,
}

impl Interp {
    pub(crate) async fn get_iterator(&self, value: &Value, span: Span) -> RunResult<IterHandle> {
        // Fast paths for internal iterables. Classification (immutable
        // borrow) is separated from allocation (mutable borrow).
        enum FastPath {
            None,
            Generator,
            SelfIterator,
            Native(NativeIterator),
        }
        let fast = {
            let st = self.st();
            match value {
                Value::Str(s) => FastPath::Native(NativeIterator::String {
                    chars: s.chars().map(|c| c.to_string().into()).collect(),
                    index: 0,
                }),
                Value::Ref(id) => match st.heap.get(*id) {
                    ObjectData::Array(_) => FastPath::Native(NativeIterator::Array { array: *id, index: 0 }),
                    ObjectData::NativeIterator(_) => FastPath::SelfIterator,
                    ObjectData::Generator(_) => FastPath::Generator,
                    ObjectData::BoundHost(HostValue::Array(arr)) => FastPath::Native(NativeIterator::HostArray {
                        array: arr.clone(),
                        index: 0,
                    }),
                    _ => FastPath::None,
                },
                _ => FastPath::None,
            }
        };
        match fast {
            FastPath::Generator => {
                return Ok(IterHandle {
                    iterator: value.clone(),
                    next: Value::Native(NativeFn::GeneratorNext),
                    is_async: false,
                });
            }
            FastPath::SelfIterator => {
                return Ok(IterHandle {
                    iterator: value.clone(),
                    next: Value::Native(NativeFn::NativeIteratorNext),
                    is_async: false,
                });
            }
            FastPath::Native(iter) => {
                let iterator = {
                    let mut st = self.st();
                    Value::Ref(st.heap.alloc(ObjectData::NativeIterator(iter)))
                };
                return Ok(IterHandle {
                    iterator,
                    next: Value::Native(NativeFn::NativeIteratorNext),
                    is_async: false,
                });
            }
            FastPath::None => {}
        }

        // Protocol lookup.
        let method = self
            .get_member(value, &PropKey::Sym(SYMBOL_ITERATOR), true, span)
            .await?;
        if method.is_nullish() {
            let desc = {
                let st = self.st();
                describe_value(&st.heap, value)
            };
            return Err(RunError::type_error(format!("{desc} is not iterable"), Some(span)));
        }
        let iterator = self.call_value(method, value.clone(), Vec::new(), span).await?;
        let next = self.get_member(&iterator, &PropKey::str("next"), false, span).await?;
        Ok(IterHandle {
            iterator,
            next,
            is_async: false,
        })
    }

    /// Async-iterator lookup with sync fallback (`for await..of` semantics).
    pub(crate) async fn get_async_iterator(&self, value: &Value, span: Span) -> RunResult<IterHandle> {
        let async_method = self
            .get_member(value, &PropKey::Sym(SYMBOL_ASYNC_ITERATOR), true, span)
            .await?;
        if !async_method.is_nullish() {
            let iterator = self.call_value(async_method, value.clone(), Vec::new(), span).await?;
            let next = self.get_member(&iterator, &PropKey::str("next"), false, span).await?;
            return Ok(IterHandle {
                iterator,
                next,
                is_async: true,
            });
        }
        // Async generator handles drive natively.
        if let Value::Ref(id) = value {
            let is_async_gen = {
                let st = self.st();
                matches!(st.heap.get(*id), ObjectData::Generator(g) if g.is_async)
            };
            if is_async_gen {
                return Ok(IterHandle {
                    iterator: value.clone(),
                    next: Value::Native(NativeFn::GeneratorNext),
                    is_async: true,
                });
            }
        }
        let mut handle = self.get_iterator(value, span).await?;
        // Sync fallback: each produced value is awaited by the loop driver.
        handle.is_async = false;
        Ok(handle)
    }

    /// One protocol step. Returns `(value, done)`.
    pub(crate) async fn iter_next(&self, handle: &IterHandle, arg: Option<Value>, span: Span) -> RunResult<(Value, bool)> {
        // Native fast path.
        if let (Value::Native(NativeFn::NativeIteratorNext), Value::Ref(id)) = (&handle.next, &handle.iterator) {
            let mut st = self.st();
            let id = *id;
            return Ok(native_iter_next(&mut st.heap, id));
        }
        if let (Value::Native(NativeFn::GeneratorNext), Value::Ref(id)) = (&handle.next, &handle.iterator) {
            let result = self
                .generator_resume(*id, ResumeMode::Next(arg.unwrap_or(Value::Undefined)), span)
                .await?;
            return self.unpack_iter_result(&result, span).await;
        }
        let args = arg.into_iter().collect();
        let result = self.call_value(handle.next.clone(), handle.iterator.clone(), args, span).await?;
        let result = if handle.is_async { self.await_value(result, span).await? } else { result };
        self.unpack_iter_result(&result, span).await
    }

    /// Reads `{value, done}` off a protocol result object.
    pub(crate) async fn unpack_iter_result(&self, result: &Value, span: Span) -> RunResult<(Value, bool)> {
        if !matches!(result, Value::Ref(_)) {
            return Err(RunError::type_error("Iterator result is not an object", Some(span)));
        }
        let done = self.get_member(result, &PropKey::str("done"), false, span).await?.truthy();
        let value = self.get_member(result, &PropKey::str("value"), false, span).await?;
        Ok((value, done))
    }

    /// Closes an iterator on early exit (`break`, `return`, `throw`,
    /// destructuring that stops early). Invokes `return()` when present;
    /// close-time errors are swallowed unless they are fatal.
    pub(crate) async fn iter_close(&self, handle: &IterHandle, span: Span) -> RunResult<()> {
        // Generator handles force-complete so pending `finally` blocks run.
        if let Value::Ref(id) = &handle.iterator {
            let is_generator = {
                let st = self.st();
                matches!(st.heap.get(*id), ObjectData::Generator(_))
            };
            if is_generator {
                match self.generator_resume(*id, ResumeMode::Return(Value::Undefined), span).await {
                    Ok(_) | Err(RunError::Throw(_)) => return Ok(()),
                    Err(fatal) => return Err(fatal),
                }
            }
        }
        let return_method = match self.get_member(&handle.iterator, &PropKey::str("return"), false, span).await {
            Ok(m) => m,
            Err(RunError::Throw(_)) => return Ok(()),
            Err(fatal) => return Err(fatal),
        };
        if return_method.is_nullish() {
            return Ok(());
        }
        match self.call_value(return_method, handle.iterator.clone(), Vec::new(), span).await {
            Ok(_) | Err(RunError::Throw(_)) => Ok(()),
            Err(fatal) => Err(fatal),
        }
    }

    /// Drains an iterable into a vector (array spread, `Array.from`, rest
    /// elements).
    pub(crate) async fn iter_collect(&self, value: &Value, span: Span) -> RunResult<Vec<Value>> {
        let handle = self.get_iterator(value, span).await?;
        let mut out = Vec::new();
        loop {
            self.on_loop_back_edge()?;
            let (item, done) = self.iter_next(&handle, None, span).await?;
            if done {
                return Ok(out);
            }
            out.push(item);
        }
    }
}

/// Advances a built-in iterator.
pub(crate) fn native_iter_next(heap: &mut crate::heap::Heap, id: HeapId) -> (Value, bool) {
    enum Step {
        Done,
        Value(Value),
        ArrayIndex(HeapId, u32),
        HostIndex(HostValue),
    }
    let step = {
        match heap.get_mut(id) {
            ObjectData::NativeIterator(iter) => match iter {
                NativeIterator::Array { array, index } => {
                    let (array, i) = (*array, *index);
                    *index += 1;
                    Step::ArrayIndex(array, i)
                }
                NativeIterator::String { chars, index } => {
                    if *index < chars.len() {
                        let value = Value::Str(chars[*index].clone());
                        *index += 1;
                        Step::Value(value)
                    } else {
                        Step::Done
                    }
                }
                NativeIterator::Values { values, index } => {
                    if *index < values.len() {
                        let value = values[*index].clone();
                        *index += 1;
                        Step::Value(value)
                    } else {
                        Step::Done
                    }
                }
                NativeIterator::HostArray { array, index } => {
                    let i = *index;
                    *index += 1;
                    match array.get(i) {
                        Some(item) => Step::HostIndex(item),
                        None => Step::Done,
                    }
                }
            },
            _ => Step::Done,
        }
    };
    match step {
        Step::Done => (Value::Undefined, true),
        Step::Value(value) => (value, false),
        Step::ArrayIndex(array, i) => match heap.get(array) {
            ObjectData::Array(arr) => {
                if i < arr.length() {
                    (arr.get(i).cloned().unwrap_or(Value::Undefined), false)
                } else {
                    (Value::Undefined, true)
                }
            }
            _ => (Value::Undefined, true),
        },
        Step::HostIndex(item) => {
            let value = crate::bridge::host_to_value(heap, &item);
            (value, false)
        }
    }
}
