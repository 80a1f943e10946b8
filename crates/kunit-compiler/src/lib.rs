pub mod classify;
pub mod concretize;
pub mod intrinsic;
pub mod rewrite;
pub mod signature;
pub mod synthesize;
pub mod watch;

pub use classify::{classify_function, ArgumentOption, BindingTable, ParameterShape};
pub use concretize::concretize;
pub use rewrite::{rewrite_driver, DriverTemplate, EngineDriver, RewriteOptions};
pub use signature::{extract_signatures, FunctionSignature, SignatureTable};
pub use synthesize::{append_driver, build_driver};
pub use watch::{WatchedVariable, WatchedVariableSet};

/// File name drivers include for the placeholder macros.
pub const PLACEHOLDER_HEADER_NAME: &str = "kunit.h";

/// Placeholder macros used by generated drivers. `UNKNOWN_LENGTH` is left
/// undefined so a variable-length input fails to compile until specialized.
pub const PLACEHOLDER_HEADER: &str = r#"#ifndef KUNIT_H
#define KUNIT_H

extern void *__symbolic(unsigned long size);
extern void __watch(void *ptr);
extern void __let(int cond);

#define SYMBOLIC(type) (*((type *) __symbolic(sizeof (type))))
#define SYMBOLIC_ARRAY(type, length) {*((type *) __symbolic(sizeof (type) * (length)))}
#define WATCH(var) __watch((void *) (&(var)))
#define LET(cond) __let(cond)
#define UNINITIALIZED {0}

#endif
"#;
