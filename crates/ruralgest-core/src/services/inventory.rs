//! Optimistic inventory writes.
//!
//! Every write lands in the local store immediately and is queued for replay
//! against the backend on the next sync round.

use serde::Serialize;
use serde_json::Map;
use uuid::Uuid;

use super::LocalStore;
use crate::error::{Error, Result};
use crate::models::{Collection, Consumption, MutationPayload, Product, Purchase, RecordKey};
use crate::util::{iso_timestamp_now, normalize_text_option};

pub const PRODUCTS_ENDPOINT: &str = "/api/produtos";
pub const PURCHASES_ENDPOINT: &str = "/api/compras";
pub const CONSUMPTION_ENDPOINT: &str = "/api/consumo";

/// Input for a new product
#[derive(Debug, Clone, PartialEq)]
pub struct NewProduct {
    pub nome: String,
    pub categoria: Option<String>,
    pub unidade: Option<String>,
    pub estoque_minimo: f64,
}

/// Input for a new purchase
#[derive(Debug, Clone, PartialEq, Default)]
pub struct NewPurchase {
    pub produto_id: String,
    pub quantidade: f64,
    pub preco_unitario: f64,
    pub fornecedor: Option<String>,
    pub nota_fiscal: Option<String>,
    pub observacoes: Option<String>,
}

/// Input for a new consumption record
#[derive(Debug, Clone, PartialEq, Default)]
pub struct NewConsumption {
    pub produto_id: String,
    pub quantidade: f64,
    pub tipo_atividade: Option<String>,
    pub descricao: Option<String>,
}

/// Inventory operations on top of the local store
#[derive(Debug, Clone)]
pub struct InventoryService {
    store: LocalStore,
}

impl InventoryService {
    pub const fn new(store: LocalStore) -> Self {
        Self { store }
    }

    pub async fn record_product(&self, input: NewProduct) -> Result<Product> {
        let nome = input.nome.trim().to_string();
        if nome.is_empty() {
            return Err(Error::InvalidInput("product name must not be empty".into()));
        }
        if !input.estoque_minimo.is_finite() || input.estoque_minimo < 0.0 {
            return Err(Error::InvalidInput(
                "minimum stock must be zero or more".into(),
            ));
        }

        let product = Product {
            id: Uuid::now_v7().to_string(),
            nome,
            categoria: normalize_text_option(input.categoria).unwrap_or_else(|| "insumo".into()),
            unidade: normalize_text_option(input.unidade).unwrap_or_else(|| "kg".into()),
            estoque_minimo: input.estoque_minimo,
            estoque_atual: 0.0,
            preco_medio: 0.0,
            extra: Map::new(),
        };

        self.write(Collection::Products, "create_product", PRODUCTS_ENDPOINT, &product)
            .await?;
        Ok(product)
    }

    pub async fn record_purchase(&self, input: NewPurchase) -> Result<Purchase> {
        let produto_id = required_product_id(&input.produto_id)?;
        require_positive("quantity", input.quantidade)?;
        if !input.preco_unitario.is_finite() || input.preco_unitario < 0.0 {
            return Err(Error::InvalidInput("unit price must be zero or more".into()));
        }

        let purchase = Purchase {
            id: Uuid::now_v7().to_string(),
            produto_nome: self.product_name(&produto_id).await?,
            produto_id,
            quantidade: input.quantidade,
            preco_unitario: input.preco_unitario,
            preco_total: input.quantidade * input.preco_unitario,
            fornecedor: normalize_text_option(input.fornecedor),
            nota_fiscal: normalize_text_option(input.nota_fiscal),
            observacoes: normalize_text_option(input.observacoes),
            usuario_nome: None,
            created_at: Some(iso_timestamp_now()),
            extra: Map::new(),
        };

        self.write(
            Collection::Purchases,
            "create_purchase",
            PURCHASES_ENDPOINT,
            &purchase,
        )
        .await?;
        Ok(purchase)
    }

    pub async fn record_consumption(&self, input: NewConsumption) -> Result<Consumption> {
        let produto_id = required_product_id(&input.produto_id)?;
        require_positive("quantity", input.quantidade)?;

        let consumption = Consumption {
            id: Uuid::now_v7().to_string(),
            produto_nome: self.product_name(&produto_id).await?,
            produto_id,
            quantidade: input.quantidade,
            tipo_atividade: normalize_text_option(input.tipo_atividade)
                .unwrap_or_else(|| "abastecimento".into()),
            descricao: normalize_text_option(input.descricao),
            usuario_nome: None,
            created_at: Some(iso_timestamp_now()),
            extra: Map::new(),
        };

        self.write(
            Collection::Consumption,
            "create_consumption",
            CONSUMPTION_ENDPOINT,
            &consumption,
        )
        .await?;
        Ok(consumption)
    }

    /// Products whose current stock is below their minimum.
    pub async fn low_stock(&self) -> Result<Vec<Product>> {
        let products: Vec<Product> = self.store.get_all_as(Collection::Products).await?;
        Ok(products
            .into_iter()
            .filter(Product::is_below_minimum)
            .collect())
    }

    async fn product_name(&self, produto_id: &str) -> Result<Option<String>> {
        let product: Option<Product> = self
            .store
            .get_by_key_as(Collection::Products, &RecordKey::from(produto_id))
            .await?;
        Ok(product.map(|product| product.nome))
    }

    async fn write<T: Serialize>(
        &self,
        collection: Collection,
        action: &str,
        endpoint: &str,
        record: &T,
    ) -> Result<()> {
        let body = serde_json::to_value(record)?;
        self.store.upsert(collection, &body).await?;
        self.store
            .enqueue_pending(action, &MutationPayload::new(endpoint, body))
            .await?;
        Ok(())
    }
}

fn required_product_id(value: &str) -> Result<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(Error::InvalidInput("product id must not be empty".into()));
    }
    Ok(value.to_string())
}

fn require_positive(field: &str, value: f64) -> Result<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(Error::InvalidInput(format!("{field} must be positive")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn service() -> (LocalStore, InventoryService) {
        let store = LocalStore::in_memory();
        (store.clone(), InventoryService::new(store))
    }

    #[tokio::test]
    async fn record_product_writes_and_queues() {
        let (store, inventory) = service();

        let product = inventory
            .record_product(NewProduct {
                nome: "  Ureia ".into(),
                categoria: None,
                unidade: Some("saco".into()),
                estoque_minimo: 20.0,
            })
            .await
            .unwrap();

        assert_eq!(product.nome, "Ureia");
        assert_eq!(product.categoria, "insumo");
        assert_eq!(product.unidade, "saco");

        let stored: Product = store
            .get_by_key_as(Collection::Products, &RecordKey::from(product.id.as_str()))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored, product);

        let pending = store.list_pending().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].action, "create_product");
        assert_eq!(pending[0].payload.endpoint, PRODUCTS_ENDPOINT);
        assert_eq!(pending[0].payload.body["nome"], json!("Ureia"));
    }

    #[tokio::test]
    async fn record_purchase_computes_total_and_product_name() {
        let (store, inventory) = service();
        store
            .upsert(Collection::Products, &json!({"id": 1, "nome": "Diesel"}))
            .await
            .unwrap();

        let purchase = inventory
            .record_purchase(NewPurchase {
                produto_id: "1".into(),
                quantidade: 4.0,
                preco_unitario: 2.5,
                fornecedor: Some("  ".into()),
                ..NewPurchase::default()
            })
            .await
            .unwrap();

        assert!((purchase.preco_total - 10.0).abs() < f64::EPSILON);
        assert_eq!(purchase.produto_nome.as_deref(), Some("Diesel"));
        assert_eq!(purchase.fornecedor, None);

        let pending = store.list_pending().await.unwrap();
        assert_eq!(pending[0].action, "create_purchase");
        assert_eq!(pending[0].payload.endpoint, PURCHASES_ENDPOINT);
        assert_eq!(pending[0].payload.body["preco_total"], json!(10.0));
    }

    #[tokio::test]
    async fn record_consumption_defaults_activity() {
        let (store, inventory) = service();

        let consumption = inventory
            .record_consumption(NewConsumption {
                produto_id: "p-1".into(),
                quantidade: 3.0,
                ..NewConsumption::default()
            })
            .await
            .unwrap();

        assert_eq!(consumption.tipo_atividade, "abastecimento");
        assert_eq!(consumption.produto_nome, None);
        assert_eq!(store.count(Collection::Consumption).await.unwrap(), 1);
        assert_eq!(
            store.list_pending().await.unwrap()[0].payload.endpoint,
            CONSUMPTION_ENDPOINT
        );
    }

    #[tokio::test]
    async fn invalid_input_writes_nothing() {
        let (store, inventory) = service();

        let blank_name = inventory
            .record_product(NewProduct {
                nome: " ".into(),
                categoria: None,
                unidade: None,
                estoque_minimo: 0.0,
            })
            .await;
        let zero_quantity = inventory
            .record_purchase(NewPurchase {
                produto_id: "1".into(),
                quantidade: 0.0,
                preco_unitario: 1.0,
                ..NewPurchase::default()
            })
            .await;
        let missing_product = inventory
            .record_consumption(NewConsumption {
                produto_id: String::new(),
                quantidade: 1.0,
                ..NewConsumption::default()
            })
            .await;

        assert!(matches!(blank_name, Err(Error::InvalidInput(_))));
        assert!(matches!(zero_quantity, Err(Error::InvalidInput(_))));
        assert!(matches!(missing_product, Err(Error::InvalidInput(_))));
        assert_eq!(store.pending_count().await.unwrap(), 0);
        assert_eq!(store.count(Collection::Products).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn low_stock_lists_products_below_minimum() {
        let (store, inventory) = service();
        store
            .upsert_many(
                Collection::Products,
                &[
                    json!({"id": 1, "nome": "Ureia", "estoque_minimo": 20, "estoque_atual": 5}),
                    json!({"id": 2, "nome": "Diesel", "estoque_minimo": 100, "estoque_atual": 400}),
                    json!({"id": 3, "nome": "Semente", "estoque_minimo": 10, "estoque_atual": 10}),
                ],
            )
            .await
            .unwrap();

        let names = inventory
            .low_stock()
            .await
            .unwrap()
            .into_iter()
            .map(|product| product.nome)
            .collect::<Vec<_>>();
        assert_eq!(names, vec!["Ureia"]);
    }
}
