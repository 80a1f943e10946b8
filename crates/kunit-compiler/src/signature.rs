use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use kunit_ir::print::render_decl;
use kunit_ir::types::{CType, Decl, ExternalDecl, TranslationUnit};

/// Structured signature of one function declared in the analyzed source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionSignature {
    pub name: String,
    /// Parameters in declaration order, every one named.
    pub params: Vec<Decl>,
    pub return_type: CType,
    #[serde(default)]
    pub variadic: bool,
}

impl FunctionSignature {
    /// Signature of a function declaration; `None` for anything else.
    /// Unnamed parameters are named `arg<i>` after their position.
    pub fn from_decl(decl: &Decl) -> Option<Self> {
        let name = decl.name.clone()?;
        let CType::Function {
            ret,
            params,
            variadic,
        } = &decl.ty
        else {
            return None;
        };
        let params = params
            .iter()
            .enumerate()
            .map(|(i, param)| Decl {
                name: Some(param.name.clone().unwrap_or_else(|| format!("arg{i}"))),
                storage: Vec::new(),
                ty: param.ty.clone(),
                init: None,
            })
            .collect();
        Some(Self {
            name,
            params,
            return_type: ret.as_ref().clone(),
            variadic: *variadic,
        })
    }

    pub fn has_return(&self) -> bool {
        !self.return_type.is_void()
    }

    pub fn param_names(&self) -> impl Iterator<Item = &str> {
        self.params.iter().filter_map(|p| p.name.as_deref())
    }

    /// Declaration text, e.g. `int get_sign(int x)`.
    pub fn render(&self) -> String {
        render_decl(&Decl::new(
            self.name.clone(),
            CType::Function {
                ret: Box::new(self.return_type.clone()),
                params: self.params.clone(),
                variadic: self.variadic,
            },
            None,
        ))
    }
}

/// Every function signature found in a translation unit, keyed by name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SignatureTable {
    signatures: BTreeMap<String, FunctionSignature>,
}

impl SignatureTable {
    pub fn get(&self, name: &str) -> Option<&FunctionSignature> {
        self.signatures.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.signatures.keys().map(String::as_str)
    }

    /// Name to rendered declaration.
    pub fn rendered(&self) -> BTreeMap<String, String> {
        self.signatures
            .iter()
            .map(|(name, sig)| (name.clone(), sig.render()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.signatures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.signatures.is_empty()
    }

    fn insert(&mut self, signature: FunctionSignature) {
        self.signatures.insert(signature.name.clone(), signature);
    }
}

/// Register prototypes and definitions alike; a later declaration of the
/// same name replaces an earlier one.
pub fn extract_signatures(unit: &TranslationUnit) -> SignatureTable {
    let mut table = SignatureTable::default();
    for item in &unit.items {
        match item {
            ExternalDecl::FunctionDef(def) => {
                if let Some(sig) = FunctionSignature::from_decl(&def.decl) {
                    table.insert(sig);
                }
            }
            ExternalDecl::Declaration(declaration) => {
                for decl in declaration.decls.iter().filter(|d| !d.is_typedef()) {
                    if let Some(sig) = FunctionSignature::from_decl(decl) {
                        table.insert(sig);
                    }
                }
            }
            ExternalDecl::TestCase(_) => {}
        }
    }
    debug!(functions = table.len(), "extracted function signatures");
    table
}
