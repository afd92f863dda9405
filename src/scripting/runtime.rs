// src/scripting/runtime.rs — One Rhai interpreter with its scope and loaded functions
//
// Top-level variables of every loaded script live in `scope`; function
// definitions of every loaded script are accumulated in `functions`.
// Method calls are evaluated as `object.method(args)` against the scope so
// that `this` is bound to the live object.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rhai::{CallFnOptions, Dynamic, Engine, EvalAltResult, FnPtr, Map, Scope, AST};

use crate::scripting::capabilities::{self, CapabilityContext};
use crate::scripting::error::ScriptError;

/// Interpreter limits applied to every engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeLimits {
    pub max_expr_depth: usize,
    pub max_function_expr_depth: usize,
    pub max_call_levels: usize,
    pub max_string_size: usize,
    pub max_array_size: usize,
    pub max_map_size: usize,
}

impl Default for RuntimeLimits {
    fn default() -> Self {
        Self {
            max_expr_depth: 64,
            max_function_expr_depth: 32,
            max_call_levels: 64,
            max_string_size: 16 * 1_048_576, // 16MB, large API responses
            max_array_size: 100_000,
            max_map_size: 100_000,
        }
    }
}

const ARG_PREFIX: &str = "__tc_arg";

pub struct Runtime {
    engine: Engine,
    scope: Scope<'static>,
    functions: AST,
    abort: Arc<AtomicBool>,
}

impl Runtime {
    pub fn new(ctx: &CapabilityContext, limits: &RuntimeLimits) -> Self {
        let mut engine = create_rhai_engine(limits);
        capabilities::register_all(&mut engine, ctx);

        let abort = Arc::new(AtomicBool::new(false));
        let flag = abort.clone();
        engine.on_progress(move |_ops| {
            if flag.load(Ordering::Relaxed) {
                Some(Dynamic::from("aborted by host"))
            } else {
                None
            }
        });

        Self {
            engine,
            scope: Scope::new(),
            functions: AST::empty(),
            abort,
        }
    }

    /// Flag checked between interpreter operations; once set, the running
    /// script terminates at its next operation.
    pub fn abort_flag(&self) -> Arc<AtomicBool> {
        self.abort.clone()
    }

    /// Compile and run a script body, keeping its functions for later calls.
    /// Functions are only kept when the whole body ran successfully.
    pub fn eval(&mut self, name: &str, text: &str) -> Result<Dynamic, ScriptError> {
        let ast = self.engine.compile(text).map_err(|e| ScriptError::Compile {
            script: name.to_string(),
            message: e.to_string(),
        })?;

        let mut combined = self.functions.merge(&ast);
        combined.set_source(name);

        let value = self
            .engine
            .eval_ast_with_scope::<Dynamic>(&mut self.scope, &combined)
            .map_err(|e| ScriptError::Runtime {
                script: name.to_string(),
                message: e.to_string(),
            })?;

        self.functions = combined.clone_functions_only();
        Ok(value)
    }

    /// A script-defined function, or a top-level variable holding a function pointer.
    pub fn has_function(&self, name: &str) -> bool {
        self.has_script_function(name) || self.global_fn_ptr(name).is_some()
    }

    fn has_script_function(&self, name: &str) -> bool {
        self.functions.iter_functions().any(|f| f.name == name)
    }

    fn global_fn_ptr(&self, name: &str) -> Option<FnPtr> {
        self.scope
            .get(name)
            .and_then(|v| v.flatten_clone().try_cast::<FnPtr>())
    }

    fn has_script_function_with_arity(&self, name: &str, arity: usize) -> bool {
        self.functions
            .iter_functions()
            .any(|f| f.name == name && f.params.len() == arity)
    }

    /// Call a top-level function. Whether the callable exists is decided
    /// here, before the call; anything raised while it runs is a call failure.
    pub fn call_function(&mut self, name: &str, args: Vec<Dynamic>) -> Result<Dynamic, ScriptError> {
        if self.has_script_function_with_arity(name, args.len()) {
            let options = CallFnOptions::new().eval_ast(false).rewind_scope(true);
            return self
                .engine
                .call_fn_with_options::<Dynamic>(
                    options,
                    &mut self.scope,
                    &self.functions,
                    name,
                    args,
                )
                .map_err(|e| call_error(name, *e));
        }

        if self.global_fn_ptr(name).is_some() && is_identifier(name) {
            return self.eval_call(&format!("{name}.call"), name, args);
        }

        Err(ScriptError::FunctionNotFound {
            name: name.to_string(),
        })
    }

    pub fn has_object(&self, name: &str) -> bool {
        self.scope
            .get(name)
            .map(|v| v.flatten_clone().is_map())
            .unwrap_or(false)
    }

    pub fn object(&self, name: &str) -> Option<Dynamic> {
        self.scope.get(name).map(|v| v.flatten_clone())
    }

    /// Place `value` in the scope under `name`, replacing any previous value.
    pub fn bind_object(&mut self, name: &str, value: Dynamic) {
        self.scope.set_or_push(name.to_string(), value);
    }

    /// Whether `object` is a map whose `method` property is callable.
    pub fn has_method(&self, object: &str, method: &str) -> bool {
        let Some(value) = self.scope.get(object) else {
            return false;
        };
        let Some(map) = value.flatten_clone().try_cast::<Map>() else {
            return false;
        };
        map.get(method)
            .map(|m| m.flatten_clone().is::<FnPtr>())
            .unwrap_or(false)
    }

    pub fn call_method(
        &mut self,
        object: &str,
        method: &str,
        args: Vec<Dynamic>,
    ) -> Result<Dynamic, ScriptError> {
        if !self.has_object(object) || !is_identifier(object) {
            return Err(ScriptError::ObjectNotFound {
                name: object.to_string(),
            });
        }
        if !self.has_method(object, method) || !is_identifier(method) {
            return Err(ScriptError::MethodNotFound {
                object: object.to_string(),
                method: method.to_string(),
            });
        }

        let label = format!("{object}.{method}");
        self.eval_call(&label, &label, args)
    }

    /// Evaluate `target(args..)` with the arguments passed through the scope.
    fn eval_call(
        &mut self,
        target: &str,
        label: &str,
        args: Vec<Dynamic>,
    ) -> Result<Dynamic, ScriptError> {
        let mark = self.scope.len();
        let mut names = Vec::with_capacity(args.len());
        for (i, arg) in args.into_iter().enumerate() {
            let name = format!("{ARG_PREFIX}{i}");
            self.scope.push_dynamic(name.clone(), arg);
            names.push(name);
        }

        let source = format!("{target}({})", names.join(", "));
        let result = match self.engine.compile(&source) {
            Ok(call) => {
                let ast = self.functions.merge(&call);
                self.engine
                    .eval_ast_with_scope::<Dynamic>(&mut self.scope, &ast)
                    .map_err(|e| call_error(label, *e))
            }
            Err(e) => Err(ScriptError::CallFailed {
                name: label.to_string(),
                message: e.to_string(),
            }),
        };

        self.scope.rewind(mark);
        result
    }
}

/// Map a Rhai error raised while `name` ran. The callable was already found,
/// so a missing function at this point was called from inside it.
fn call_error(name: &str, err: EvalAltResult) -> ScriptError {
    match err {
        EvalAltResult::ErrorTerminated(..) => ScriptError::CallFailed {
            name: name.to_string(),
            message: "terminated by host".into(),
        },
        other => ScriptError::CallFailed {
            name: name.to_string(),
            message: other.to_string(),
        },
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Create a Rhai engine with the given limits. Capabilities are added by the caller.
pub fn create_rhai_engine(limits: &RuntimeLimits) -> Engine {
    let mut engine = Engine::new();

    engine.set_max_expr_depths(limits.max_expr_depth, limits.max_function_expr_depth);
    engine.set_max_call_levels(limits.max_call_levels);
    engine.set_max_string_size(limits.max_string_size);
    engine.set_max_array_size(limits.max_array_size);
    engine.set_max_map_size(limits.max_map_size);

    // Scripts may not pull in other files through `import`.
    engine.set_module_resolver(rhai::module_resolvers::DummyModuleResolver::new());

    engine
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scripting::capabilities::test_support::context;

    fn runtime() -> Runtime {
        Runtime::new(&context(), &RuntimeLimits::default())
    }

    #[test]
    fn test_eval_keeps_variables_and_functions() {
        let mut rt = runtime();
        rt.eval("first", "let counter = 40; fn add(a, b) { a + b }")
            .unwrap();
        let value = rt.eval("second", "add(counter, 2)").unwrap();
        assert_eq!(value.as_int().unwrap(), 42);
        assert!(rt.has_function("add"));
    }

    #[test]
    fn test_failed_eval_keeps_earlier_functions_only() {
        let mut rt = runtime();
        rt.eval("lib", "fn keep() { 1 }").unwrap();
        let err = rt
            .eval("broken", "fn dropped() { 2 } throw \"boom\";")
            .unwrap_err();
        assert!(matches!(err, ScriptError::Runtime { ref script, .. } if script == "broken"));
        assert!(rt.has_function("keep"));
        assert!(!rt.has_function("dropped"));
    }

    #[test]
    fn test_compile_error_names_script() {
        let mut rt = runtime();
        let err = rt.eval("bad.rhai", "fn broken( {").unwrap_err();
        match err {
            ScriptError::Compile { script, .. } => assert_eq!(script, "bad.rhai"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_call_function_not_found_vs_raised() {
        let mut rt = runtime();
        rt.eval("s", r#"fn fails() { throw "nope"; }"#).unwrap();

        let missing = rt.call_function("absent", vec![]).unwrap_err();
        assert!(missing.is_not_found());

        let raised = rt.call_function("fails", vec![]).unwrap_err();
        assert!(!raised.is_not_found());
        assert!(raised.to_string().contains("nope"));
    }

    #[test]
    fn test_call_function_wrong_arity_is_not_found() {
        let mut rt = runtime();
        rt.eval("s", "fn one(a) { a }").unwrap();
        let err = rt.call_function("one", vec![]).unwrap_err();
        assert!(err.is_not_found(), "{err}");
    }

    #[test]
    fn test_missing_callee_inside_function_is_a_call_failure() {
        let mut rt = runtime();
        rt.eval("s", "fn GetMods() { GetModsCached() }").unwrap();
        let err = rt.call_function("GetMods", vec![]).unwrap_err();
        assert!(!err.is_not_found(), "{err}");
        match err {
            ScriptError::CallFailed { name, message } => {
                assert_eq!(name, "GetMods");
                assert!(message.contains("GetModsCached"));
            }
            other => panic!("expected CallFailed, got {other}"),
        }
    }

    #[test]
    fn test_call_global_closure_variable() {
        let mut rt = runtime();
        rt.eval("s", "let double = |x| x * 2;").unwrap();
        assert!(rt.has_function("double"));
        let value = rt
            .call_function("double", vec![Dynamic::from(21_i64)])
            .unwrap();
        assert_eq!(value.as_int().unwrap(), 42);
    }

    #[test]
    fn test_method_call_binds_this_and_mutates_object() {
        let mut rt = runtime();
        rt.eval(
            "s",
            r#"
let plugin = #{
    count: 0,
    Bump: |by| { this.count += by; this.count },
};
"#,
        )
        .unwrap();

        assert!(rt.has_object("plugin"));
        assert!(rt.has_method("plugin", "Bump"));
        assert!(!rt.has_method("plugin", "count"));

        rt.call_method("plugin", "Bump", vec![Dynamic::from(2_i64)])
            .unwrap();
        let value = rt
            .call_method("plugin", "Bump", vec![Dynamic::from(3_i64)])
            .unwrap();
        assert_eq!(value.as_int().unwrap(), 5);

        // Argument slots do not leak into the scope.
        assert!(rt.object("__tc_arg0").is_none());
    }

    #[test]
    fn test_method_call_with_named_function_pointer() {
        let mut rt = runtime();
        rt.eval(
            "s",
            r#"
fn greet(name) { `hello ${name}` }
let plugin = #{ Greet: Fn("greet") };
"#,
        )
        .unwrap();
        let value = rt
            .call_method("plugin", "Greet", vec![Dynamic::from("rhai")])
            .unwrap();
        assert_eq!(value.into_string().unwrap(), "hello rhai");
    }

    #[test]
    fn test_method_lookup_errors() {
        let mut rt = runtime();
        rt.eval("s", "let plugin = #{ value: 1 }; let scalar = 5;")
            .unwrap();

        let err = rt.call_method("nothing", "Go", vec![]).unwrap_err();
        assert!(matches!(err, ScriptError::ObjectNotFound { .. }));

        let err = rt.call_method("scalar", "Go", vec![]).unwrap_err();
        assert!(matches!(err, ScriptError::ObjectNotFound { .. }));

        let err = rt.call_method("plugin", "Go", vec![]).unwrap_err();
        assert!(matches!(err, ScriptError::MethodNotFound { .. }));
    }

    #[test]
    fn test_bind_object() {
        let mut rt = runtime();
        let mut map = Map::new();
        map.insert("name".into(), Dynamic::from("bound"));
        rt.bind_object("plugin", Dynamic::from_map(map));
        assert!(rt.has_object("plugin"));
        let value = rt.eval("s", "plugin.name").unwrap();
        assert_eq!(value.into_string().unwrap(), "bound");
    }

    #[test]
    fn test_abort_flag_terminates_script() {
        let mut rt = runtime();
        rt.abort_flag().store(true, Ordering::Relaxed);
        let err = rt.eval("loop", "loop { }").unwrap_err();
        assert!(matches!(err, ScriptError::Runtime { .. }));
    }

    #[test]
    fn test_import_is_disabled() {
        let mut rt = runtime();
        assert!(rt.eval("s", r#"import "other" as other;"#).is_err());
    }

    #[test]
    fn test_is_identifier() {
        assert!(is_identifier("GetMods"));
        assert!(is_identifier("_private1"));
        assert!(!is_identifier("1abc"));
        assert!(!is_identifier("a.b"));
        assert!(!is_identifier("x); evil("));
        assert!(!is_identifier(""));
    }
}
