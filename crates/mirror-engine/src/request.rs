use mirror_contracts::assets::ImageAsset;
use mirror_contracts::prompts::{user_prompt, BASE_IMAGE_LABEL, GARMENT_IMAGE_LABEL, SYSTEM_PROMPT};
use serde::{Deserialize, Serialize};

/// Raw media carried inside a request or response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InlineData {
    #[serde(default, alias = "mime_type", skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    /// Standard base64, no `data:` header.
    #[serde(default)]
    pub data: String,
}

/// One fragment of generation content. On the wire a part is an object with
/// either a `text` or an `inlineData` member; anything else decodes as
/// [`Part::Other`] and is ignored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "WirePart", into = "WirePart")]
pub enum Part {
    Text(String),
    InlineData(InlineData),
    Other,
}

impl Part {
    pub fn text(value: impl Into<String>) -> Self {
        Self::Text(value.into())
    }

    pub fn image(asset: &ImageAsset) -> Self {
        Self::InlineData(InlineData {
            mime_type: Some(asset.mime_type().to_string()),
            data: asset.base64().to_string(),
        })
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct WirePart {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(
        default,
        rename = "inlineData",
        alias = "inline_data",
        skip_serializing_if = "Option::is_none"
    )]
    inline_data: Option<InlineData>,
}

impl From<WirePart> for Part {
    fn from(wire: WirePart) -> Self {
        if let Some(inline) = wire.inline_data {
            return Part::InlineData(inline);
        }
        match wire.text {
            Some(text) => Part::Text(text),
            None => Part::Other,
        }
    }
}

impl From<Part> for WirePart {
    fn from(part: Part) -> Self {
        match part {
            Part::Text(text) => WirePart {
                text: Some(text),
                inline_data: None,
            },
            Part::InlineData(inline) => WirePart {
                text: None,
                inline_data: Some(inline),
            },
            Part::Other => WirePart::default(),
        }
    }
}

/// Builds the ordered request content. The model reads the parts in order,
/// so the sequence is fixed: system prompt, person label, person image,
/// garment label, garment image, user instruction.
pub fn assemble(person: &ImageAsset, garment: &ImageAsset, instruction: &str) -> Vec<Part> {
    vec![
        Part::text(SYSTEM_PROMPT),
        Part::text(BASE_IMAGE_LABEL),
        Part::image(person),
        Part::text(GARMENT_IMAGE_LABEL),
        Part::image(garment),
        Part::text(user_prompt(instruction)),
    ]
}

#[cfg(test)]
mod tests {
    use mirror_contracts::assets::ImageAsset;
    use mirror_contracts::prompts::{DEFAULT_STYLE_CLAUSE, SYSTEM_PROMPT};
    use serde_json::{json, Value};

    use super::{assemble, InlineData, Part};

    fn assets() -> anyhow::Result<(ImageAsset, ImageAsset)> {
        let person = ImageAsset::from_bytes(vec![1u8, 2, 3], "image/jpeg", "person.jpg")?;
        let garment = ImageAsset::from_bytes(vec![9u8, 8, 7, 6], "image/png", "garment.png")?;
        Ok((person, garment))
    }

    #[test]
    fn assemble_produces_six_parts_in_fixed_order() -> anyhow::Result<()> {
        let (person, garment) = assets()?;
        let parts = assemble(&person, &garment, "");
        assert_eq!(parts.len(), 6);
        match &parts[0] {
            Part::Text(text) => {
                assert_eq!(text, SYSTEM_PROMPT);
                assert!(text.starts_with("You are a professional photo retoucher"));
            }
            other => panic!("expected system prompt, got {other:?}"),
        }
        assert_eq!(
            parts[1],
            Part::text(
                "The following is [Image 1: base image / person photo] (Base Image - Keep Face ID & Pose):"
            )
        );
        assert_eq!(
            parts[2],
            Part::InlineData(InlineData {
                mime_type: Some("image/jpeg".to_string()),
                data: person.base64().to_string(),
            })
        );
        assert_eq!(
            parts[3],
            Part::text("The following is [Image 2: garment photo] (Garment Reference):")
        );
        assert_eq!(
            parts[4],
            Part::InlineData(InlineData {
                mime_type: Some("image/png".to_string()),
                data: garment.base64().to_string(),
            })
        );
        match &parts[5] {
            Part::Text(text) => {
                assert!(text.starts_with("Perform the virtual try-on task:"));
                assert!(text.trim_end().ends_with(
                    "[Style requirement]: Preserve the original photographic style and lighting so the result looks like a real candid photo."
                ));
            }
            other => panic!("expected instruction text, got {other:?}"),
        }
        Ok(())
    }

    #[test]
    fn instruction_lands_in_last_part() -> anyhow::Result<()> {
        let (person, garment) = assets()?;
        let parts = assemble(&person, &garment, "business casual");
        match parts.last() {
            Some(Part::Text(text)) => {
                assert!(text.contains("business casual"));
                assert!(!text.contains(DEFAULT_STYLE_CLAUSE));
            }
            other => panic!("expected instruction text, got {other:?}"),
        }
        Ok(())
    }

    #[test]
    fn parts_serialize_to_wire_shape() -> anyhow::Result<()> {
        let (person, _) = assets()?;
        let value = serde_json::to_value(vec![Part::text("hi"), Part::image(&person)])?;
        assert_eq!(
            value,
            json!([
                {"text": "hi"},
                {"inlineData": {"mimeType": "image/jpeg", "data": person.base64()}}
            ])
        );
        Ok(())
    }

    #[test]
    fn parts_decode_by_shape() -> anyhow::Result<()> {
        let parts: Vec<Part> = serde_json::from_value(json!([
            {"text": "caption", "thought": false},
            {"inline_data": {"mime_type": "image/webp", "data": "AAAA"}},
            {"inlineData": {"data": "BBBB"}},
            {"functionCall": {"name": "noop"}}
        ]))?;
        assert_eq!(parts[0], Part::Text("caption".to_string()));
        assert_eq!(
            parts[1],
            Part::InlineData(InlineData {
                mime_type: Some("image/webp".to_string()),
                data: "AAAA".to_string(),
            })
        );
        assert_eq!(
            parts[2],
            Part::InlineData(InlineData {
                mime_type: None,
                data: "BBBB".to_string(),
            })
        );
        assert_eq!(parts[3], Part::Other);
        let _: Value = serde_json::to_value(&parts[3])?;
        Ok(())
    }
}
