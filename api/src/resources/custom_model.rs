use base64::{engine::general_purpose::STANDARD, Engine};
use log::info;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::{
    error::{Error, Result},
    params::{Query, Selector},
    resources::str_field,
    session::MemberId,
    Client, Request,
};

const MODEL_STRUCTURE: &str = "decision_tree";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomModel {
    pub id: u64,

    #[serde(default)]
    pub name: Option<String>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A bidding model written in the console's decision tree language.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewCustomModel {
    pub name: String,
    pub member_id: MemberId,
    pub advertiser_id: Option<u64>,
    pub model_output: String,
    /// Plain model text, encoded before it is sent.
    pub model_text: String,
}

impl NewCustomModel {
    fn to_body(&self, encoded_text: &str) -> Value {
        json!({
            "custom_model": {
                "name": self.name,
                "member_id": self.member_id,
                "advertiser_id": self.advertiser_id,
                "custom_model_structure": MODEL_STRUCTURE,
                "model_output": self.model_output,
                "model_text": encoded_text,
            }
        })
    }
}

impl Client {
    pub fn get_custom_models(&self) -> Result<Vec<CustomModel>> {
        let mut response = self.get(self.endpoints().custom_model().clone(), &Query::new())?;
        let models = response
            .get_mut("custom_models")
            .map(Value::take)
            .unwrap_or_else(|| Value::Array(Vec::new()));
        serde_json::from_value(models).map_err(Error::BadJsonResponse)
    }

    pub fn get_custom_model(&self, model_id: u64) -> Result<Value> {
        self.get(
            self.endpoints().custom_model().clone(),
            &Selector::Id(model_id).into(),
        )
    }

    /// Validate a model with the parser service. Returns the encoded model text on success.
    pub fn check_custom_model(&self, model_text: &str) -> Result<String> {
        let encoded = STANDARD.encode(model_text.as_bytes());
        let response = self.execute(
            &Request::post(self.endpoints().custom_model_parser().clone())
                .json(json!({"custom-model-parser": {"model_text": encoded}})),
        )?;
        if let Some(code) = str_field(&response, "error_code") {
            return Err(Error::InvalidParams {
                code: code.to_owned(),
                message: str_field(&response, "error")
                    .unwrap_or("invalid model")
                    .to_owned(),
            });
        }
        Ok(encoded)
    }

    pub fn add_custom_model(&self, model: &NewCustomModel) -> Result<Value> {
        let encoded = self.check_custom_model(&model.model_text)?;
        let response = self.execute(
            &Request::post(self.endpoints().custom_model().clone()).json(model.to_body(&encoded)),
        )?;
        info!("Added custom model `{}`", model.name);
        Ok(response)
    }

    /// Replace the model called `name` with `model`.
    pub fn modify_custom_model(&self, name: &str, model: &NewCustomModel) -> Result<Value> {
        let encoded = self.check_custom_model(&model.model_text)?;
        let model_id = self
            .get_custom_models()?
            .into_iter()
            .find(|existing| existing.name.as_deref() == Some(name))
            .map(|existing| existing.id)
            .ok_or_else(|| Error::UnknownModel {
                name: name.to_owned(),
            })?;

        let query = Query::from(Selector::Id(model_id));
        let response = self.execute(
            &Request::put(self.endpoints().custom_model().clone())
                .query(query.to_pairs()?)
                .json(model.to_body(&encoded)),
        )?;
        info!("Modified custom model `{name}` ({model_id})");
        Ok(response)
    }

    pub fn delete_custom_model(&self, model_id: u64) -> Result<Value> {
        let query = Query::from(Selector::Id(model_id));
        self.execute(
            &Request::delete(self.endpoints().custom_model().clone()).query(query.to_pairs()?),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::client;
    use mockito::{Matcher, Server};
    use pretty_assertions::assert_eq;

    const MODEL: &str = "if segment[123] then 1.5\nelse 0.5";

    fn model() -> NewCustomModel {
        NewCustomModel {
            name: "retargeting".to_owned(),
            member_id: MemberId(958),
            advertiser_id: Some(7),
            model_output: "bid_modifier".to_owned(),
            model_text: MODEL.to_owned(),
        }
    }

    fn mock_parser(server: &mut Server, body: &str) -> mockito::Mock {
        server
            .mock("POST", "/custom-model-parser")
            .match_body(Matcher::Json(
                json!({"custom-model-parser": {"model_text": STANDARD.encode(MODEL)}}),
            ))
            .with_body(body)
            .expect(1)
            .create()
    }

    #[test]
    fn test_check_rejects_invalid_model() {
        let mut server = Server::new();
        let parser = mock_parser(
            &mut server,
            r#"{"response": {"error_code": "SYNTAX", "error": "unexpected token"}}"#,
        );

        let client = client(&server.url());
        match client.check_custom_model(MODEL) {
            Err(Error::InvalidParams { code, message }) => {
                assert_eq!(code, "SYNTAX");
                assert_eq!(message, "unexpected token");
            }
            other => panic!("expected invalid params, got {other:?}"),
        }
        parser.assert();
    }

    #[test]
    fn test_add_sends_encoded_model() {
        let mut server = Server::new();
        let parser = mock_parser(&mut server, r#"{"response": {"status": "OK"}}"#);
        let add = server
            .mock("POST", "/custom-model")
            .match_body(Matcher::PartialJson(json!({"custom_model": {
                "name": "retargeting",
                "member_id": 958,
                "custom_model_structure": "decision_tree",
                "model_text": STANDARD.encode(MODEL),
            }})))
            .with_body(r#"{"response": {"status": "OK", "id": 31}}"#)
            .expect(1)
            .create();

        let client = client(&server.url());
        let response = client.add_custom_model(&model()).unwrap();
        assert_eq!(response["id"], 31);
        parser.assert();
        add.assert();
    }

    #[test]
    fn test_modify_looks_up_model_by_name() {
        let mut server = Server::new();
        let _parser = mock_parser(&mut server, r#"{"response": {"status": "OK"}}"#);
        server
            .mock("GET", "/custom-model")
            .with_body(
                r#"{"response": {"custom_models": [{"id": 30, "name": "other"}, {"id": 31, "name": "retargeting"}]}}"#,
            )
            .create();
        let put = server
            .mock("PUT", "/custom-model")
            .match_query(Matcher::UrlEncoded("id".into(), "31".into()))
            .with_body(r#"{"response": {"status": "OK"}}"#)
            .expect(1)
            .create();

        let client = client(&server.url());
        client.modify_custom_model("retargeting", &model()).unwrap();
        put.assert();
    }

    #[test]
    fn test_modify_unknown_model() {
        let mut server = Server::new();
        let _parser = mock_parser(&mut server, r#"{"response": {"status": "OK"}}"#);
        server
            .mock("GET", "/custom-model")
            .with_body(r#"{"response": {"custom_models": []}}"#)
            .create();
        let put = server.mock("PUT", "/custom-model").expect(0).create();

        let client = client(&server.url());
        assert!(matches!(
            client.modify_custom_model("retargeting", &model()),
            Err(Error::UnknownModel { ref name }) if name == "retargeting"
        ));
        put.assert();
    }
}
