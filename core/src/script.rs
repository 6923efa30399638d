//! Embedded rhai host for trigger/activity scripts.
//!
//! Scripts are compiled once at definition load and evaluated with a scope
//! containing `vars` (the live variable table) and `caps` (the regex
//! captures of the current match). A gate script must evaluate to `true`
//! for the notification to proceed; any error or non-true result counts as
//! a refusal and is logged, never propagated.

use rhai::{AST, Dynamic, Engine, Map, Scope};

use crate::vars::{VarValue, VariableStore};

/// Operation budget per evaluation; scripts are short predicates, anything
/// past this is a runaway.
const MAX_SCRIPT_OPS: u64 = 100_000;

pub struct ScriptHost {
    engine: Engine,
}

impl Default for ScriptHost {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptHost {
    pub fn new() -> Self {
        let mut engine = Engine::new();
        engine.set_max_operations(MAX_SCRIPT_OPS);
        engine.set_max_call_levels(16);
        Self { engine }
    }

    /// Compile a script snippet. Errors are returned as display strings so
    /// the definition compiler can record them without a rhai dependency in
    /// its error type.
    pub fn compile(&self, code: &str) -> Result<AST, String> {
        self.engine.compile(code).map_err(|e| e.to_string())
    }

    /// Evaluate a gate script. `captures` carries the current match's
    /// numbered and named groups as string pairs.
    pub fn eval_gate(
        &self,
        ast: &AST,
        vars: &VariableStore,
        captures: &[(String, String)],
    ) -> Result<bool, String> {
        let mut scope = Scope::new();
        scope.push_constant("vars", var_map(vars));
        scope.push_constant("caps", capture_map(captures));

        let result: Dynamic = self
            .engine
            .eval_ast_with_scope(&mut scope, ast)
            .map_err(|e| e.to_string())?;

        Ok(result.as_bool().unwrap_or(false))
    }

    /// Run a side-effect script (activity completion). The result value is
    /// ignored; errors are surfaced for logging.
    pub fn eval_effect(
        &self,
        ast: &AST,
        vars: &VariableStore,
        captures: &[(String, String)],
    ) -> Result<(), String> {
        let mut scope = Scope::new();
        scope.push_constant("vars", var_map(vars));
        scope.push_constant("caps", capture_map(captures));

        self.engine
            .eval_ast_with_scope::<Dynamic>(&mut scope, ast)
            .map(|_| ())
            .map_err(|e| e.to_string())
    }
}

fn var_map(vars: &VariableStore) -> Map {
    let mut map = Map::new();
    for view in vars.snapshot() {
        let value: Dynamic = match view.value {
            VarValue::Bool(b) => b.into(),
            VarValue::Int(i) => i.into(),
            VarValue::Text(s) => s.into(),
        };
        map.insert(view.name.into(), value);
    }
    map
}

fn capture_map(captures: &[(String, String)]) -> Map {
    let mut map = Map::new();
    for (key, value) in captures {
        map.insert(key.as_str().into(), value.clone().into());
    }
    map
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gate_reads_variables() {
        let host = ScriptHost::new();
        let vars = VariableStore::new();
        vars.set_direct("phase", VarValue::Int(2), "");

        let ast = host.compile(r#"vars["phase"] == 2"#).unwrap();
        assert!(host.eval_gate(&ast, &vars, &[]).unwrap());

        vars.set_direct("phase", VarValue::Int(3), "");
        assert!(!host.eval_gate(&ast, &vars, &[]).unwrap());
    }

    #[test]
    fn test_gate_reads_captures() {
        let host = ScriptHost::new();
        let vars = VariableStore::new();
        let caps = vec![
            ("0".to_string(), "casts Twister".to_string()),
            ("ability".to_string(), "Twister".to_string()),
        ];

        let ast = host.compile(r#"caps["ability"] == "Twister""#).unwrap();
        assert!(host.eval_gate(&ast, &vars, &caps).unwrap());
    }

    #[test]
    fn test_non_bool_result_is_refusal() {
        let host = ScriptHost::new();
        let vars = VariableStore::new();
        let ast = host.compile("42").unwrap();
        assert!(!host.eval_gate(&ast, &vars, &[]).unwrap());
    }

    #[test]
    fn test_missing_variable_never_passes_the_gate() {
        let host = ScriptHost::new();
        let vars = VariableStore::new();
        let ast = host.compile(r#"vars["absent"] == true"#).unwrap();
        // Missing keys read as unit or error depending on engine version;
        // either way the gate must not pass.
        assert!(!host.eval_gate(&ast, &vars, &[]).unwrap_or(false));
    }

    #[test]
    fn test_compile_error_reported() {
        let host = ScriptHost::new();
        assert!(host.compile("let = ;").is_err());
    }
}
