use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use kunit_ir::expr::Expr;
use kunit_ir::print::render_type;
use kunit_ir::types::{AggregateKind, CType, Decl, TypeSpec};

use crate::signature::{FunctionSignature, SignatureTable};

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ClassifyError {
    #[error("Unknown function '{name}'")]
    UnknownFunction { name: String },

    #[error("Unsupported shape: parameter '{parameter}' of '{function}' has a function type")]
    UnsupportedShape { function: String, parameter: String },

    #[error("Unknown parameter '{parameter}' of '{function}'")]
    UnknownParameter { function: String, parameter: String },

    #[error("Illegal option '{option}' for parameter '{parameter}' (legal: {})", .legal.iter().map(|o| o.to_string()).collect::<Vec<_>>().join(", "))]
    IllegalOption {
        parameter: String,
        option: ArgumentOption,
        legal: Vec<ArgumentOption>,
    },

    #[error("Function '{function}' returns void; there is no return value to watch")]
    NoReturnValue { function: String },
}

// ── Shapes and options ───────────────────────────────────────────────

/// Shape of a parameter declarator, derived once from its type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParameterShape {
    Scalar,
    FixedArray(u64),
    VariableArray,
    Struct,
    Pointer,
}

impl ParameterShape {
    /// Shape of a parameter type; `None` for function and pointer-to-function types.
    pub fn of(ty: &CType) -> Option<Self> {
        match ty {
            CType::Named {
                spec:
                    TypeSpec::Aggregate {
                        kind: AggregateKind::Struct | AggregateKind::Union,
                        ..
                    },
                ..
            } => Some(ParameterShape::Struct),
            CType::Named { .. } => Some(ParameterShape::Scalar),
            CType::Array { dim, .. } => Some(
                match dim.as_deref().and_then(Expr::as_integer) {
                    Some(n) => ParameterShape::FixedArray(n),
                    None => ParameterShape::VariableArray,
                },
            ),
            CType::Pointer { pointee, .. } if matches!(pointee.as_ref(), CType::Function { .. }) => None,
            CType::Pointer { .. } => Some(ParameterShape::Pointer),
            CType::Function { .. } => None,
        }
    }

    /// Strategies a parameter of this shape may use. `None` is always last.
    pub fn legal_options(&self) -> Vec<ArgumentOption> {
        use ArgumentOption::*;
        match self {
            ParameterShape::Scalar => vec![Symbolic, None],
            ParameterShape::Struct => vec![Symbolic, ExpandedStruct, None],
            ParameterShape::FixedArray(_) => vec![SymbolicArray, ExpandedArray, None],
            ParameterShape::VariableArray => vec![SymbolicArray, None],
            ParameterShape::Pointer => vec![SymbolicArray, PointerOut, PointerInOut, None],
        }
    }
}

/// Input-generation strategy for one driver argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArgumentOption {
    None,
    Symbolic,
    SymbolicArray,
    ExpandedArray,
    ExpandedStruct,
    PointerOut,
    PointerInOut,
}

impl fmt::Display for ArgumentOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ArgumentOption::None => "none",
            ArgumentOption::Symbolic => "symbolic",
            ArgumentOption::SymbolicArray => "symbolic_array",
            ArgumentOption::ExpandedArray => "expanded_array",
            ArgumentOption::ExpandedStruct => "expanded_struct",
            ArgumentOption::PointerOut => "pointer_out",
            ArgumentOption::PointerInOut => "pointer_in_out",
        })
    }
}

// ── Analysis ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterInfo {
    pub name: String,
    pub rendered_type: String,
    pub shape: ParameterShape,
    pub options: Vec<ArgumentOption>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionAnalysis {
    pub signature: FunctionSignature,
    pub params: Vec<ParameterInfo>,
    pub has_return: bool,
}

pub fn classify_function(
    table: &SignatureTable,
    name: &str,
) -> Result<FunctionAnalysis, ClassifyError> {
    let signature = table.get(name).ok_or_else(|| ClassifyError::UnknownFunction {
        name: name.to_string(),
    })?;

    let mut params = Vec::with_capacity(signature.params.len());
    for param in &signature.params {
        let param_name = param.name.clone().unwrap_or_default();
        let shape = ParameterShape::of(&param.ty).ok_or_else(|| ClassifyError::UnsupportedShape {
            function: name.to_string(),
            parameter: param_name.clone(),
        })?;
        params.push(ParameterInfo {
            name: param_name,
            rendered_type: render_type(&param.ty),
            shape,
            options: shape.legal_options(),
        });
    }

    debug!(function = name, params = params.len(), "classified parameters");
    Ok(FunctionAnalysis {
        signature: signature.clone(),
        params,
        has_return: signature.has_return(),
    })
}

// ── Bindings ─────────────────────────────────────────────────────────

/// One parameter with its shape and chosen strategy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArgumentBinding {
    pub param: Decl,
    pub shape: ParameterShape,
    pub option: ArgumentOption,
}

impl ArgumentBinding {
    pub fn name(&self) -> &str {
        self.param.name.as_deref().unwrap_or_default()
    }
}

/// Chosen strategies for every parameter of the analyzed function.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BindingTable {
    signature: FunctionSignature,
    bindings: Vec<ArgumentBinding>,
    watch_return: bool,
}

impl BindingTable {
    /// Every option defaults to the first legal entry; the return value is
    /// watched whenever there is one.
    pub fn from_analysis(analysis: &FunctionAnalysis) -> Self {
        let bindings = analysis
            .signature
            .params
            .iter()
            .zip(&analysis.params)
            .map(|(param, info)| ArgumentBinding {
                param: param.clone(),
                shape: info.shape,
                option: info.options[0],
            })
            .collect();
        Self {
            signature: analysis.signature.clone(),
            bindings,
            watch_return: analysis.has_return,
        }
    }

    pub fn signature(&self) -> &FunctionSignature {
        &self.signature
    }

    pub fn bindings(&self) -> &[ArgumentBinding] {
        &self.bindings
    }

    pub fn watch_return(&self) -> bool {
        self.watch_return
    }

    pub fn option(&self, parameter: &str) -> Option<ArgumentOption> {
        self.bindings
            .iter()
            .find(|b| b.name() == parameter)
            .map(|b| b.option)
    }

    pub fn set_option(&mut self, parameter: &str, option: ArgumentOption) -> Result<(), ClassifyError> {
        let function = self.signature.name.clone();
        let binding = self
            .bindings
            .iter_mut()
            .find(|b| b.name() == parameter)
            .ok_or_else(|| ClassifyError::UnknownParameter {
                function,
                parameter: parameter.to_string(),
            })?;
        let legal = binding.shape.legal_options();
        if !legal.contains(&option) {
            return Err(ClassifyError::IllegalOption {
                parameter: parameter.to_string(),
                option,
                legal,
            });
        }
        binding.option = option;
        Ok(())
    }

    pub fn set_watch_return(&mut self, watch: bool) -> Result<(), ClassifyError> {
        if watch && !self.signature.has_return() {
            return Err(ClassifyError::NoReturnValue {
                function: self.signature.name.clone(),
            });
        }
        self.watch_return = watch;
        Ok(())
    }
}
