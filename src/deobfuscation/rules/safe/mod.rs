//! Rules that rewrite syntax without executing anything.
//!
//! Each submodule groups rules by the construct they target. All of them are exported
//! flat so the pipeline in [`crate::deobfuscation::rules::safe_rules`] can list them.

mod control;
mod functions;
mod literals;
mod references;
mod structure;

pub use control::{
    RearrangeSwitches, ReplaceBooleanExpressionsWithIf, ResolveDeterministicIfStatements,
    ResolveRedundantLogicalExpressions, SimplifyIfStatements,
};
pub use functions::{
    ReplaceCallExpressionsWithUnwrappedIdentifier, ReplaceFunctionShellsWithWrappedValue,
    ReplaceFunctionShellsWithWrappedValueIIFE, SimplifyCalls, UnwrapFunctionShells,
    UnwrapIIFEs, UnwrapSimpleOperations,
};
pub use literals::{
    ParseTemplateLiteralsIntoStringLiterals, ReplaceEvalCallsWithLiteralContent,
    ReplaceNewFuncCallsWithLiteralContent, ResolveFunctionConstructorCalls,
};
pub use references::{
    ReplaceIdentifierWithFixedAssignedValue,
    ReplaceIdentifierWithFixedValueNotAssignedAtDeclaration,
    ResolveMemberExpressionReferencesToArrayIndex, ResolveMemberExpressionsWithDirectAssignment,
    ResolveProxyCalls, ResolveProxyReferences, ResolveProxyVariables,
};
pub use structure::{
    NormalizeEmptyStatements, RearrangeSequences, RemoveRedundantBlockStatements,
    ReplaceSequencesWithExpressions, SeparateChainedDeclarators,
};
