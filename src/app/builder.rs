//! Step-by-step filter construction
//!
//! ```text
//!  Field ──field──▶ Operator ──op──▶ Unit ──unit──▶ Value ──value──▶ Logical
//!    ▲                 │  (numeric)                   ▲                │  │
//!    │                 └──────────op (text)───────────┘                │  │
//!    └──────────────────────────── && / || ────────────────────────────┘  │
//!                                                             finish ──▶ Done
//! ```
//!
//! `Back` walks one step towards `Field`; `Back` on `Field` cancels.

use crate::models::{
    Filter, FilterChain, FilterError, FilterField, LogicalOperator, Operator, Unit,
};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuilderState {
    Field,
    Operator,
    Unit,
    Value,
    Logical,
    Done,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq)]
pub enum BuilderInput {
    Field(FilterField),
    Operator(Operator),
    Unit(Unit),
    Value(String),
    /// Link another filter with `&&` or `||`
    Chain(LogicalOperator),
    /// Commit the pending filter and stop
    Finish,
    Back,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum BuilderError {
    #[error("{input} is not accepted while choosing {state:?}")]
    UnexpectedInput { state: BuilderState, input: String },
    #[error("filter value must not be empty")]
    EmptyValue,
    #[error(transparent)]
    Filter(#[from] FilterError),
}

impl BuilderInput {
    fn label(&self) -> String {
        match self {
            BuilderInput::Field(field) => format!("field {field}"),
            BuilderInput::Operator(op) => format!("operator {op}"),
            BuilderInput::Unit(unit) => format!("unit {unit}"),
            BuilderInput::Value(value) => format!("value {value:?}"),
            BuilderInput::Chain(logical) => format!("logical {}", logical.as_str()),
            BuilderInput::Finish => "finish".to_string(),
            BuilderInput::Back => "back".to_string(),
        }
    }
}

/// The transition table. `numeric` is whether the pending field takes a unit.
fn transition(state: BuilderState, input: &BuilderInput, numeric: bool) -> Option<BuilderState> {
    use BuilderState as S;
    let next = match (state, input) {
        (S::Field, BuilderInput::Field(_)) => S::Operator,
        (S::Operator, BuilderInput::Operator(_)) if numeric => S::Unit,
        (S::Operator, BuilderInput::Operator(_)) => S::Value,
        (S::Unit, BuilderInput::Unit(_)) => S::Value,
        (S::Value, BuilderInput::Value(_)) => S::Logical,
        (S::Logical, BuilderInput::Chain(_)) => S::Field,
        (S::Logical, BuilderInput::Finish) => S::Done,

        (S::Field, BuilderInput::Back) => S::Cancelled,
        (S::Operator, BuilderInput::Back) => S::Field,
        (S::Unit, BuilderInput::Back) => S::Operator,
        (S::Value, BuilderInput::Back) if numeric => S::Unit,
        (S::Value, BuilderInput::Back) => S::Operator,
        (S::Logical, BuilderInput::Back) => S::Value,
        _ => return None,
    };
    Some(next)
}

/// Assembles a [`FilterChain`] one choice at a time
#[derive(Debug, Clone)]
pub struct FilterBuilder {
    state: BuilderState,
    committed: Vec<Filter>,
    field: Option<FilterField>,
    operator: Option<Operator>,
    unit: Option<Unit>,
    pending: Option<Filter>,
}

impl Default for FilterBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl FilterBuilder {
    pub fn new() -> Self {
        Self {
            state: BuilderState::Field,
            committed: Vec::new(),
            field: None,
            operator: None,
            unit: None,
            pending: None,
        }
    }

    pub fn state(&self) -> BuilderState {
        self.state
    }

    /// Filters completed so far
    pub fn committed(&self) -> &[Filter] {
        &self.committed
    }

    /// Operators offered at the operator step
    pub fn operator_choices(&self) -> &'static [Operator] {
        self.field.as_ref().map(|f| f.operators()).unwrap_or(&[])
    }

    /// Units offered at the unit step
    pub fn unit_choices(&self) -> &'static [Unit] {
        self.field.as_ref().map(|f| f.units()).unwrap_or(&[])
    }

    fn numeric(&self) -> bool {
        !self.unit_choices().is_empty()
    }

    pub fn apply(&mut self, input: BuilderInput) -> Result<BuilderState, BuilderError> {
        // A field choice decides the branch, so look ahead at it
        let numeric = match &input {
            BuilderInput::Field(field) => !field.units().is_empty(),
            _ => self.numeric(),
        };
        let next = transition(self.state, &input, numeric).ok_or_else(|| {
            BuilderError::UnexpectedInput {
                state: self.state,
                input: input.label(),
            }
        })?;

        match input {
            BuilderInput::Field(field) => {
                self.field = Some(field);
                self.operator = None;
                self.unit = None;
            }
            BuilderInput::Operator(op) => {
                if !self.operator_choices().contains(&op) {
                    return Err(FilterError::IllegalOperator {
                        field: self.field_key(),
                        operator: op.to_string(),
                    }
                    .into());
                }
                self.operator = Some(op);
            }
            BuilderInput::Unit(unit) => {
                if !self.unit_choices().contains(&unit) {
                    return Err(FilterError::IllegalUnit {
                        field: self.field_key(),
                        unit: unit.to_string(),
                    }
                    .into());
                }
                self.unit = Some(unit);
            }
            BuilderInput::Value(value) => {
                if value.is_empty() {
                    return Err(BuilderError::EmptyValue);
                }
                self.pending = Some(self.build(value)?);
            }
            BuilderInput::Chain(logical) => {
                if let Some(filter) = self.pending.take() {
                    self.committed.push(filter.then(logical));
                }
                self.field = None;
            }
            BuilderInput::Finish => {
                if let Some(filter) = self.pending.take() {
                    self.committed.push(filter);
                }
            }
            BuilderInput::Back => {
                if self.state == BuilderState::Logical {
                    self.pending = None;
                }
            }
        }

        self.state = next;
        Ok(next)
    }

    fn field_key(&self) -> String {
        self.field.as_ref().map(|f| f.key()).unwrap_or_default()
    }

    fn build(&self, value: String) -> Result<Filter, BuilderError> {
        let (Some(field), Some(op)) = (self.field.clone(), self.operator) else {
            return Err(BuilderError::UnexpectedInput {
                state: self.state,
                input: format!("value {value:?}"),
            });
        };
        Ok(Filter::new(field, op, self.unit, value)?)
    }

    /// The finished chain, once the builder reached `Done`
    pub fn into_chain(self) -> Option<FilterChain> {
        (self.state == BuilderState::Done).then(|| FilterChain::from(self.committed))
    }
}
