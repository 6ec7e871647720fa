//! Inventory models: products, purchases and consumption records

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// A product kept in stock
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    pub nome: String,
    #[serde(default = "default_category")]
    pub categoria: String,
    #[serde(default = "default_unit")]
    pub unidade: String,
    /// Stock level below which the product is flagged
    #[serde(default)]
    pub estoque_minimo: f64,
    #[serde(default)]
    pub estoque_atual: f64,
    /// Weighted average purchase price
    #[serde(default)]
    pub preco_medio: f64,
    /// Fields owned by the remote authority that this client does not model
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Product {
    /// True when current stock has dropped below the configured minimum.
    pub fn is_below_minimum(&self) -> bool {
        self.estoque_atual < self.estoque_minimo
    }
}

/// A stock purchase
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Purchase {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(deserialize_with = "string_or_number")]
    pub produto_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub produto_nome: Option<String>,
    pub quantidade: f64,
    pub preco_unitario: f64,
    #[serde(default)]
    pub preco_total: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fornecedor: Option<String>,
    /// Invoice reference
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nota_fiscal: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observacoes: Option<String>,
    /// Creator's display name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usuario_nome: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Stock consumed by a farm activity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Consumption {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(deserialize_with = "string_or_number")]
    pub produto_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub produto_nome: Option<String>,
    pub quantidade: f64,
    #[serde(default = "default_activity")]
    pub tipo_atividade: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub descricao: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usuario_nome: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn default_category() -> String {
    "insumo".to_string()
}

fn default_unit() -> String {
    "kg".to_string()
}

fn default_activity() -> String {
    "abastecimento".to_string()
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(value) => Ok(value),
        Value::Number(value) => Ok(value.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number id, got {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn product_accepts_numeric_id_and_defaults() {
        let product: Product =
            serde_json::from_value(json!({"id": 1, "nome": "Ureia", "estoque_atual": 10}))
                .unwrap();

        assert_eq!(product.id, "1");
        assert_eq!(product.categoria, "insumo");
        assert_eq!(product.unidade, "kg");
        assert!((product.estoque_atual - 10.0).abs() < f64::EPSILON);
    }

    #[test]
    fn product_keeps_unmodeled_fields() {
        let raw = json!({
            "id": "p-1",
            "nome": "Diesel",
            "categoria": "combustivel",
            "unidade": "L",
            "fazenda_id": "f-9"
        });
        let product: Product = serde_json::from_value(raw).unwrap();
        assert_eq!(product.extra.get("fazenda_id"), Some(&json!("f-9")));

        let back = serde_json::to_value(&product).unwrap();
        assert_eq!(back["fazenda_id"], json!("f-9"));
    }

    #[test]
    fn product_below_minimum() {
        let product: Product = serde_json::from_value(json!({
            "id": "p-1",
            "nome": "Ureia",
            "estoque_minimo": 20,
            "estoque_atual": 5
        }))
        .unwrap();
        assert!(product.is_below_minimum());
    }

    #[test]
    fn consumption_defaults_activity_type() {
        let consumption: Consumption = serde_json::from_value(json!({
            "id": "c-1",
            "produto_id": 1,
            "quantidade": 3.5
        }))
        .unwrap();
        assert_eq!(consumption.produto_id, "1");
        assert_eq!(consumption.tipo_atividade, "abastecimento");
    }
}
