mod patterns;
mod policy;

pub use patterns::{
    PatternSet, RuleList, RuleSpec, builtin_injection_rules, builtin_sensitive_rules,
};
pub use policy::{BlockKind, DEFAULT_MAX_QUESTION_CHARS, GuardrailPolicy, GuardrailVerdict};
