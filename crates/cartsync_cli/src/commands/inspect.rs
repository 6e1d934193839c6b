//! Inspect command implementation.

use cartsync_engine::{CartPersistence, CartSnapshot, PersistenceError};
use cartsync_storage::FileBlobStore;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;

/// Blob inspection result.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InspectResult {
    /// Blob store directory.
    pub path: String,
    /// Blob key.
    pub key: String,
    /// `present`, `absent` or `invalid`.
    pub status: &'static str,
    /// Why the blob was rejected.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// The restored cart.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cart: Option<CartSnapshot>,
}

/// Runs the inspect command.
///
/// The blob is left in place even when it fails validation.
pub fn run(path: &Path, key: &str, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    if !path.is_dir() {
        return Err(format!("No blob store found at {}", path.display()).into());
    }
    let result = inspect(path, key)?;

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&result)?),
        _ => print!("{}", render_text(&result)),
    }
    Ok(())
}

/// Loads and validates one blob.
pub fn inspect(path: &Path, key: &str) -> Result<InspectResult, Box<dyn std::error::Error>> {
    let store = FileBlobStore::open(path)?;
    let persistence = CartPersistence::new(Arc::new(store)).with_key(key);

    let mut result = InspectResult {
        path: path.display().to_string(),
        key: key.to_string(),
        status: "absent",
        error: None,
        cart: None,
    };
    match persistence.try_load() {
        Ok(Some(state)) => {
            result.status = "present";
            result.cart = Some(state.snapshot());
        }
        Ok(None) => {}
        Err(PersistenceError::Storage(e)) => return Err(e.into()),
        Err(e) => {
            result.status = "invalid";
            result.error = Some(e.to_string());
        }
    }
    Ok(result)
}

fn render_text(result: &InspectResult) -> String {
    let mut out = format!("Cart blob '{}' in {}\n", result.key, result.path);
    match (&result.cart, &result.error) {
        (Some(cart), _) => {
            for item in &cart.items {
                out.push_str(&format!(
                    "  {:>8}  {:<32} {:>4} x {:>10} = {:>10}\n",
                    item.product_id.to_string(),
                    item.name,
                    item.quantity,
                    item.unit_price.to_string(),
                    item.line_total().to_string()
                ));
            }
            out.push_str(&format!(
                "Items: {}  Units: {}  Total: {}\n",
                cart.items.len(),
                cart.total_items,
                cart.total_amount
            ));
        }
        (None, Some(error)) => out.push_str(&format!("Invalid: {error}\n")),
        (None, None) => out.push_str("No saved cart\n"),
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use cartsync_engine::CartState;
    use cartsync_storage::BlobStore;
    use cartsync_testkit::item;
    use tempfile::TempDir;

    #[test]
    fn inspect_saved_cart() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(FileBlobStore::open(dir.path()).unwrap());
        let state = CartState::from_items([item(1, 1000, None).with_quantity(2), item(2, 250, None)]);
        CartPersistence::new(store).save(&state).unwrap();

        let result = inspect(dir.path(), "cart").unwrap();
        assert_eq!(result.status, "present");
        let cart = result.cart.as_ref().unwrap();
        assert_eq!(cart.total_items, 3);

        let text = render_text(&result);
        assert!(text.contains("Units: 3"));
        assert!(text.contains("Total: 22.50"));
    }

    #[test]
    fn inspect_missing_and_corrupt() {
        let dir = TempDir::new().unwrap();
        assert_eq!(inspect(dir.path(), "cart").unwrap().status, "absent");

        let store = FileBlobStore::open(dir.path()).unwrap();
        store.write("cart", b"{not json").unwrap();
        let result = inspect(dir.path(), "cart").unwrap();
        assert_eq!(result.status, "invalid");
        assert!(result.error.is_some());
        assert!(store.read("cart").unwrap().is_some());
    }
}
