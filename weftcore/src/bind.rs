//! Attachment configuration binding.
//!
//! Before a body is touched, every attachment's construction arguments are
//! checked against the aspect's declared parameter shape: same arity, and
//! each value's static type equal to the declared parameter type.
use wefthook::AspectDescriptor;
use weftir::value::Value;

use crate::error::BindingError;

pub fn bind_arguments(
    descriptor: &AspectDescriptor,
    arguments: &[Value],
) -> Result<(), BindingError> {
    if descriptor.config_params.len() != arguments.len() {
        return Err(BindingError::ArityMismatch {
            aspect: descriptor.name.clone(),
            expected: descriptor.config_params.len(),
            found: arguments.len(),
        });
    }
    for (param, value) in descriptor.config_params.iter().zip(arguments) {
        let found = value.type_token();
        if found != param.ty {
            return Err(BindingError::TypeMismatch {
                aspect: descriptor.name.clone(),
                param: param.name.clone(),
                expected: param.ty,
                found,
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use wefthook::{Capabilities, ConfigParam};
    use weftir::types::TypeToken;

    fn descriptor() -> AspectDescriptor {
        AspectDescriptor::new("log", Capabilities::ENTRY).with_config_params(vec![
            ConfigParam::new("category", TypeToken::STR),
            ConfigParam::new("verbose", TypeToken::BOOL),
        ])
    }

    #[test]
    fn accepts_matching_arguments() {
        let args = vec![Value::from("audit"), Value::from(true)];
        assert_eq!(bind_arguments(&descriptor(), &args), Ok(()));
    }

    #[test]
    fn rejects_wrong_arity_and_wrong_types() {
        assert!(matches!(
            bind_arguments(&descriptor(), &[Value::from("audit")]),
            Err(BindingError::ArityMismatch { .. })
        ));
        assert!(matches!(
            bind_arguments(&descriptor(), &[Value::from("audit"), Value::from(1)]),
            Err(BindingError::TypeMismatch { ref param, .. }) if param == "verbose"
        ));
    }
}
