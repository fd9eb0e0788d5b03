//! The variable dependency graph
//!
//! Holds named variables, each either a literal value or an expression over
//! other variables and built-in functions. Values are computed on demand and
//! memoized; every evaluation re-validates dependency acyclicity by carrying
//! the set of names currently being resolved on the call stack.

use dashmap::DashMap;
use hearth_matcher::{
    match_numeric_expression, match_string_with_vars, ParseContext, Token,
};
use std::collections::HashSet;
use tokio::sync::broadcast;
use tracing::debug;

use crate::ast::{build_expression, BinaryOp, Expr};
use crate::config::VariableConfig;
use crate::error::{EvalError, EvalResult};
use crate::functions::{builtin_functions, builtin_signatures, BuiltinFunction};
use crate::units;
use crate::value::Value;

/// Channel capacity for variable change events
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Change notification fired by the manager
#[derive(Debug, Clone, PartialEq)]
pub enum VariableEvent {
    /// A variable was defined or redefined
    Changed { name: String },

    /// A variable was removed
    Removed { name: String },
}

/// A variable definition
#[derive(Debug, Clone)]
enum VariableDefinition {
    /// Literal value with unit
    Value(Value),

    /// Compiled expression over other variables
    Expression {
        expression: String,
        expr: Expr,
        dependencies: Vec<String>,
    },
}

/// One named variable with its memoized last-computed value
#[derive(Debug, Clone)]
struct Variable {
    definition: VariableDefinition,
    last_value: Option<Value>,
}

/// The variable dependency graph
///
/// Exclusively owns its [`Variable`] entities. Evaluation never mutates a
/// variable's definition, only its memoized cache, so concurrent independent
/// evaluations are safe; each root evaluation call carries its own
/// "currently resolving" set.
pub struct VariableManager {
    variables: DashMap<String, Variable>,
    events: broadcast::Sender<VariableEvent>,
}

impl VariableManager {
    /// Create an empty manager
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            variables: DashMap::new(),
            events,
        }
    }

    /// Subscribe to variable change events
    pub fn subscribe(&self) -> broadcast::Receiver<VariableEvent> {
        self.events.subscribe()
    }

    /// A parse context seeded with all known variables and the built-in
    /// function table
    pub fn parse_context(&self) -> ParseContext {
        ParseContext::new()
            .with_variables(self.variables.iter().map(|e| e.key().clone()))
            .with_functions(builtin_signatures())
    }

    /// Replace a variable with a literal value
    pub fn set_variable_to_value(&self, name: &str, value: Value) {
        debug!(variable = name, ?value, "setting variable to value");
        self.variables.insert(
            name.to_string(),
            Variable {
                last_value: Some(value.clone()),
                definition: VariableDefinition::Value(value),
            },
        );
        let _ = self.events.send(VariableEvent::Changed {
            name: name.to_string(),
        });
    }

    /// Parse an expression string and install it as a variable definition
    ///
    /// A leading `"` selects the interpolated-string form; anything else is
    /// parsed as a numeric expression. The whole string must be consumed.
    /// Parse failures return the errors accumulated on the parse context and
    /// leave any existing definition untouched.
    pub fn set_variable_to_expr(&self, name: &str, expression: &str) -> EvalResult<()> {
        let trimmed = expression.trim();
        let mut context = self.parse_context();
        // Self-references parse; the cycle check rejects them at evaluation.
        context.variables.insert(name.to_string());

        let result = if trimmed.starts_with('"') {
            match_string_with_vars(trimmed, &mut context)
        } else {
            match_numeric_expression(trimmed, &mut context)
        };

        let tokens = match result {
            Some(m) if m.next_input.is_empty() => m.value,
            Some(m) => {
                return Err(EvalError::parse(
                    context.errors,
                    format!(
                        "Unexpected input \"{}\" at the end of expression \"{}\"",
                        m.next_input, trimmed
                    ),
                ))
            }
            None => {
                return Err(EvalError::parse(
                    context.errors,
                    format!("Could not parse expression \"{}\"", trimmed),
                ))
            }
        };

        let expr = build_expression(&tokens)?;
        let dependencies = expr.variable_names();
        debug!(
            variable = name,
            expression = trimmed,
            ?dependencies,
            "setting variable to expression"
        );

        self.variables.insert(
            name.to_string(),
            Variable {
                definition: VariableDefinition::Expression {
                    expression: trimmed.to_string(),
                    expr,
                    dependencies,
                },
                last_value: None,
            },
        );
        let _ = self.events.send(VariableEvent::Changed {
            name: name.to_string(),
        });
        Ok(())
    }

    /// Remove a variable
    ///
    /// Removing an unknown name is caller misuse and fails synchronously.
    pub fn remove_variable(&self, name: &str) -> EvalResult<()> {
        self.variables
            .remove(name)
            .ok_or_else(|| EvalError::UndefinedVariable(name.to_string()))?;
        debug!(variable = name, "removed variable");
        let _ = self.events.send(VariableEvent::Removed {
            name: name.to_string(),
        });
        Ok(())
    }

    /// Check whether a variable is defined
    pub fn is_variable_defined(&self, name: &str) -> bool {
        self.variables.contains_key(name)
    }

    /// All defined variable names, sorted
    pub fn get_variable_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.variables.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    /// Recompute and return a variable's value
    pub fn get_variable_updated_value(&self, name: &str) -> EvalResult<Value> {
        self.resolve(name, &mut HashSet::new())
    }

    /// The memoized value from the last successful computation, if any
    pub fn get_variable_last_value(&self, name: &str) -> Option<Value> {
        self.variables.get(name)?.last_value.clone()
    }

    /// Free variable names of an expression variable, empty for literals
    ///
    /// Consumers reacting to [`VariableEvent::Changed`] use this to discover
    /// dependents by re-resolving free names; the graph itself keeps no
    /// back-pointers.
    pub fn get_variable_dependencies(&self, name: &str) -> Option<Vec<String>> {
        let variable = self.variables.get(name)?;
        match &variable.definition {
            VariableDefinition::Value(_) => Some(Vec::new()),
            VariableDefinition::Expression { dependencies, .. } => Some(dependencies.clone()),
        }
    }

    /// Evaluate a token sequence to a bare number, dropping its unit
    pub fn evaluate_numeric_expression(&self, tokens: &[Token]) -> EvalResult<f64> {
        self.evaluate_expression_with_units(tokens)?.as_number()
    }

    /// Evaluate a token sequence to a value with its propagated unit
    pub fn evaluate_expression_with_units(&self, tokens: &[Token]) -> EvalResult<Value> {
        let expr = build_expression(tokens)?;
        self.eval(&expr, None, &mut HashSet::new())
    }

    /// Evaluate a token sequence to text
    pub fn evaluate_string_expression(&self, tokens: &[Token]) -> EvalResult<String> {
        Ok(self
            .eval(&build_expression(tokens)?, None, &mut HashSet::new())?
            .to_string())
    }

    /// Snapshot all definitions as configuration, sorted by name
    pub fn get_config(&self) -> Vec<VariableConfig> {
        let mut configs: Vec<VariableConfig> = self
            .variables
            .iter()
            .map(|entry| match &entry.value().definition {
                VariableDefinition::Value(value) => {
                    VariableConfig::from_value(entry.key().clone(), value.clone())
                }
                VariableDefinition::Expression { expression, .. } => VariableConfig::Expression {
                    name: entry.key().clone(),
                    expression: expression.clone(),
                },
            })
            .collect();
        configs.sort_by(|a, b| a.name().cmp(b.name()));
        configs
    }

    /// Install definitions from configuration, in order
    pub fn load_config(&self, configs: Vec<VariableConfig>) -> EvalResult<()> {
        for config in configs {
            match config {
                VariableConfig::Value { name, value, unit } => {
                    self.set_variable_to_value(&name, value.into_value(unit));
                }
                VariableConfig::Expression { name, expression } => {
                    self.set_variable_to_expr(&name, &expression)?;
                }
            }
        }
        Ok(())
    }

    // Resolve one variable, recursing through its dependencies. `visiting`
    // holds the names currently being resolved on this call stack.
    fn resolve(&self, name: &str, visiting: &mut HashSet<String>) -> EvalResult<Value> {
        let definition = {
            let variable = self
                .variables
                .get(name)
                .ok_or_else(|| EvalError::UndefinedVariable(name.to_string()))?;
            variable.definition.clone()
        };

        match definition {
            VariableDefinition::Value(value) => Ok(value),
            VariableDefinition::Expression { expr, .. } => {
                visiting.insert(name.to_string());
                let result = self.eval(&expr, Some(name), visiting);
                visiting.remove(name);

                if let Ok(value) = &result {
                    if let Some(mut variable) = self.variables.get_mut(name) {
                        variable.last_value = Some(value.clone());
                    }
                }
                result
            }
        }
    }

    // Evaluate a tree. `owner` is the variable whose expression this is; a
    // reference back into the resolving set closes a dependency cycle, which
    // is reported at the owner.
    fn eval(
        &self,
        expr: &Expr,
        owner: Option<&str>,
        visiting: &mut HashSet<String>,
    ) -> EvalResult<Value> {
        match expr {
            Expr::Number(n) => Ok(Value::number(*n)),
            Expr::Text(s) => Ok(Value::text(s.clone())),
            Expr::Variable(dependency) => {
                if visiting.contains(dependency) {
                    let at = owner.unwrap_or(dependency.as_str());
                    return Err(EvalError::DependencyCycle(at.to_string()));
                }
                self.resolve(dependency, visiting)
            }
            Expr::Function { name, args } => {
                let function = self.builtin(name)?;
                let values: Vec<Value> = args
                    .iter()
                    .map(|arg| self.eval(arg, owner, visiting))
                    .collect::<EvalResult<_>>()?;
                function.call(&values)
            }
            Expr::Binary { op, left, right } => {
                let left = self.eval(left, owner, visiting)?;
                let right = self.eval(right, owner, visiting)?;
                let (a, b) = (left.as_number()?, right.as_number()?);
                let value = match op {
                    BinaryOp::Add => Value::Number {
                        value: a + b,
                        unit: units::combine_additive("add", left.unit(), right.unit())?,
                    },
                    BinaryOp::Sub => Value::Number {
                        value: a - b,
                        unit: units::combine_additive("subtract", left.unit(), right.unit())?,
                    },
                    BinaryOp::Mul => Value::Number {
                        value: a * b,
                        unit: units::combine_multiply(left.unit(), right.unit()),
                    },
                    BinaryOp::Div => Value::Number {
                        value: a / b,
                        unit: units::combine_divide(left.unit(), right.unit()),
                    },
                };
                Ok(value)
            }
            Expr::Concat { left, right } => {
                let left = self.eval(left, owner, visiting)?;
                let right = self.eval(right, owner, visiting)?;
                Ok(Value::text(format!("{}{}", left, right)))
            }
        }
    }

    fn builtin(&self, name: &str) -> EvalResult<&'static BuiltinFunction> {
        builtin_functions()
            .iter()
            .find(|f| f.name == name)
            .ok_or_else(|| EvalError::UndefinedFunction(name.to_string()))
    }
}

impl Default for VariableManager {
    fn default() -> Self {
        Self::new()
    }
}
