use crate::models::{ParamDecl, Parametrization};

use super::context::CallContext;

/// Recover the parametrization values of the enclosing suite from the calling context.
///
/// `decls` are the suite's declarations in application order. The innermost frame binding
/// every declared name supplies the values, which are returned last-applied declaration first.
/// No declarations, or no frame binding them, yields an empty parametrization.
pub fn extract(context: &CallContext, decls: &[ParamDecl]) -> Parametrization {
    if decls.is_empty() {
        return Parametrization::new();
    }

    let Some(frame) = context
        .innermost_first()
        .find(|frame| decls.iter().all(|d| frame.bindings.contains(&d.name)))
    else {
        tracing::warn!(
            params = ?decls.iter().map(|d| d.name.as_str()).collect::<Vec<_>>(),
            "no frame binds the declared parameters"
        );
        return Parametrization::new();
    };

    decls
        .iter()
        .rev()
        .filter_map(|decl| {
            let value = frame.bindings.get(&decl.name)?;
            if !decl.values.is_empty() && !decl.values.iter().any(|v| v == value) {
                tracing::warn!(
                    param = %decl.name,
                    value,
                    "value is not one of the declared values"
                );
            }
            Some((decl.name.clone(), value.to_string()))
        })
        .collect()
}
