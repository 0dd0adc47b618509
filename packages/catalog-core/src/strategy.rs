use crate::catalog::CatalogStore;
use crate::error::Result;
use crate::model::{ChangeDescriptor, Product};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaItem {
    pub url: String,
    pub caption: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Action {
    pub label: String,
    pub url: String,
}

/// The seam the strategy renderer calls through to reach the external
/// chat platform. `chat-transport` provides the one real implementation.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    async fn send_media_group(
        &self,
        chat: &str,
        items: &[MediaItem],
    ) -> std::result::Result<Vec<String>, String>;

    async fn send_message(
        &self,
        chat: &str,
        text: &str,
        action: Option<Action>,
    ) -> std::result::Result<String, String>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum StrategyKind {
    S1,
    S2,
    S3,
}

impl StrategyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyKind::S1 => "S1",
            StrategyKind::S2 => "S2",
            StrategyKind::S3 => "S3",
        }
    }

    pub fn default_strategy() -> StrategyKind {
        StrategyKind::S2
    }
}

const MEDIA_LIMIT: i64 = 10;

fn cta_text(product: &Product) -> String {
    let price = product
        .price
        .as_ref()
        .map(|p| format!(" — {}{}", p.currency, p.amount))
        .unwrap_or_default();
    format!(
        "{}{}",
        product.title.clone().unwrap_or_else(|| product.product_key.clone()),
        price
    )
}

fn cta_action(product: &Product) -> Action {
    Action {
        label: "View product".to_string(),
        url: product.url.clone(),
    }
}

fn change_line(change: &ChangeDescriptor) -> String {
    if change.changed_fields.is_empty() {
        "Product content changed".to_string()
    } else {
        format!("Changed: {}", change.changed_fields.join(", "))
    }
}

/// Renders an outbox event into a message bundle for the given chat.
/// Returns the message ids produced and the strategy actually used, which
/// may differ from the requested one (S1 degrades to S2 when there is no
/// media for this product version).
pub async fn render<C: CatalogStore, T: ChatTransport>(
    requested: StrategyKind,
    chat: &str,
    product: &Product,
    change: &ChangeDescriptor,
    catalog: &C,
    transport: &T,
) -> Result<(Vec<String>, StrategyKind)> {
    match requested {
        StrategyKind::S1 => {
            let media = catalog
                .list_media(&product.product_key, product.version, MEDIA_LIMIT)
                .await?;
            if media.is_empty() {
                return render_s2(chat, product, transport).await;
            }
            let mut items: Vec<MediaItem> = media
                .iter()
                .map(|m| MediaItem {
                    url: m.local_path.clone().unwrap_or_else(|| m.source_url.clone()),
                    caption: None,
                })
                .collect();
            if let Some(first) = items.first_mut() {
                first.caption = Some(cta_text(product));
            }
            let mut message_ids = transport
                .send_media_group(chat, &items)
                .await
                .map_err(crate::error::CoreError::Transport)?;
            let cta_id = transport
                .send_message(chat, &cta_text(product), Some(cta_action(product)))
                .await
                .map_err(crate::error::CoreError::Transport)?;
            message_ids.push(cta_id);
            Ok((message_ids, StrategyKind::S1))
        }
        StrategyKind::S2 => render_s2(chat, product, transport).await,
        StrategyKind::S3 => {
            let media = catalog
                .list_media(&product.product_key, product.version, MEDIA_LIMIT)
                .await?;
            let text = format!("{}\n{}", change_line(change), cta_text(product));
            let mut message_ids = vec![transport
                .send_message(chat, &text, Some(cta_action(product)))
                .await
                .map_err(crate::error::CoreError::Transport)?];
            if !media.is_empty() {
                let items: Vec<MediaItem> = media
                    .iter()
                    .map(|m| MediaItem {
                        url: m.local_path.clone().unwrap_or_else(|| m.source_url.clone()),
                        caption: None,
                    })
                    .collect();
                let mut group_ids = transport
                    .send_media_group(chat, &items)
                    .await
                    .map_err(crate::error::CoreError::Transport)?;
                message_ids.append(&mut group_ids);
            }
            Ok((message_ids, StrategyKind::S3))
        }
    }
}

async fn render_s2<T: ChatTransport>(
    chat: &str,
    product: &Product,
    transport: &T,
) -> Result<(Vec<String>, StrategyKind)> {
    let id = transport
        .send_message(chat, &cta_text(product), Some(cta_action(product)))
        .await
        .map_err(crate::error::CoreError::Transport)?;
    Ok((vec![id], StrategyKind::S2))
}
