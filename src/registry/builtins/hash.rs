// Copyright 2024 OctoFHIR Team
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.


//! Hash built-ins

use super::super::{BuiltIn, BuiltInCall, BuiltInRegistry};
use crate::environment::Environment;
use crate::error::EvalResult;
use crate::model::{HashExModel, Value};

pub(super) fn register(registry: &mut BuiltInRegistry) {
    registry.register("keys", on_hash_ex(|hash| hash.keys().into_iter().map(Value::from).collect()));
    registry.register("values", on_hash_ex(|hash| hash.values()));
}

/// A sequence built from an extended hash, in the hash's own order
fn on_hash_ex(items: fn(&dyn HashExModel) -> Vec<Value>) -> impl BuiltIn {
    move |call: &BuiltInCall<'_>, env: &mut Environment<'_>| -> EvalResult<Option<Value>> {
        let value = call.target_value(env)?;
        match value.as_hash_ex() {
            Some(hash) => Ok(Some(Value::sequence(items(hash)))),
            None => Err(call.unexpected_type(&value, "extended hash").into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::ast::{BuiltInExpr, Call, Expression, Interpolation, Literal, Variable};
    use crate::settings::Configuration;
    use crate::Value;
    use indexmap::IndexMap;
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use std::sync::Arc;

    /// `${target?name?join(", ")}`
    fn render_joined(target: Value, name: &str) -> Result<String, crate::RenderError> {
        let listed: Arc<dyn Expression> =
            Arc::new(BuiltInExpr::new(Arc::new(Variable::new("target")), name));
        let joined = Call::new(
            Arc::new(BuiltInExpr::new(listed, "join")),
            vec![Arc::new(Literal::new(", "))],
        );
        let data = Value::hash(IndexMap::from([("target".to_string(), target)]));
        Arc::new(Configuration::default())
            .create_template("hash.ftl", Arc::new(Interpolation::new(Arc::new(joined))))
            .render_to_string(Some(data))
    }

    fn pairs() -> Value {
        Value::hash(IndexMap::from([
            ("b".to_string(), Value::from(2)),
            ("a".to_string(), Value::from(1)),
            ("c".to_string(), Value::from("three")),
        ]))
    }

    #[rstest]
    #[case("keys", "b, a, c")]
    #[case("values", "2, 1, three")]
    fn test_hash_sequences_keep_hash_order(#[case] name: &str, #[case] expected: &str) {
        assert_eq!(render_joined(pairs(), name).unwrap(), expected);
    }

    #[rstest]
    #[case("keys")]
    #[case("values")]
    fn test_non_hash_is_rejected(#[case] name: &str) {
        let error = render_joined(Value::from("text"), name).unwrap_err().to_string();
        assert!(error.contains(&format!("?{name}")), "{error}");
        assert!(error.contains("extended hash"), "{error}");
    }

    #[test]
    fn test_empty_hash() {
        assert_eq!(render_joined(Value::hash(IndexMap::new()), "keys").unwrap(), "");
    }
}
