//! Decides whether a rule may run against a given kind of content.

use crate::content::ContentClass;
use crate::rules::compiler::RuleScope;

/// `prompt` rules see prompt bodies, `field` rules see field values, and
/// `global` rules see everything. There is no partial or wildcard matching.
pub fn is_eligible(scope: RuleScope, class: ContentClass) -> bool {
    match scope {
        RuleScope::Global => true,
        RuleScope::Prompt => class == ContentClass::PromptBody,
        RuleScope::Field => class == ContentClass::FieldAtPath,
    }
}
