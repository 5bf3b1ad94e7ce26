use async_trait::async_trait;
use image::DynamicImage;
use log::{debug, warn};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::io::Cursor;

use super::catalog::{
    CatalogEntry, CatalogListing, CatalogSource, FetchError, ItemDetail, ItemSummary, Stat,
    Summary,
};

pub const DEFAULT_BASE_URL: &str = "https://pokeapi.co/api/v2";

const LISTING_LIMIT: u32 = 2000;
const THUMBNAIL_SIZE: u32 = 192;

#[derive(Debug, Deserialize)]
struct PokemonResponse {
    id: u32,
    name: String,
    types: Vec<TypeSlot>,
    sprites: Sprites,
    #[serde(default)]
    stats: Vec<StatSlot>,
    species: NamedResource,
}

#[derive(Debug, Deserialize)]
struct TypeSlot {
    #[serde(rename = "type")]
    kind: NamedResource,
}

#[derive(Debug, Deserialize)]
struct StatSlot {
    base_stat: u32,
    stat: NamedResource,
}

#[derive(Debug, Deserialize)]
struct NamedResource {
    name: String,
    url: String,
}

#[derive(Debug, Deserialize)]
struct Sprites {
    front_default: Option<String>,
    #[serde(default)]
    other: Option<OtherSprites>,
}

#[derive(Debug, Deserialize)]
struct OtherSprites {
    #[serde(rename = "official-artwork")]
    official_artwork: Option<Artwork>,
}

#[derive(Debug, Deserialize)]
struct Artwork {
    front_default: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SpeciesResponse {
    generation: NamedResource,
}

#[derive(Debug, Deserialize)]
struct ListResponse {
    count: u32,
    results: Vec<NamedResource>,
}

impl Sprites {
    fn preferred_url(&self) -> Option<String> {
        self.other
            .as_ref()
            .and_then(|o| o.official_artwork.as_ref())
            .and_then(|a| a.front_default.clone())
            .or_else(|| self.front_default.clone())
    }
}

fn parse_summary(pokemon: &PokemonResponse) -> ItemSummary {
    ItemSummary {
        id: pokemon.id,
        name: pokemon.name.clone(),
        types: pokemon.types.iter().map(|t| t.kind.name.clone()).collect(),
        image_url: pokemon.sprites.preferred_url(),
    }
}

fn parse_detail(pokemon: PokemonResponse, species: SpeciesResponse) -> ItemDetail {
    let generation = species.generation;
    let generation_label = id_from_resource_url(&generation.url)
        .map(to_roman)
        .unwrap_or_default();

    ItemDetail {
        id: pokemon.id,
        image_url: pokemon.sprites.preferred_url(),
        types: pokemon.types.iter().map(|t| t.kind.name.clone()).collect(),
        stats: pokemon
            .stats
            .into_iter()
            .map(|s| Stat {
                name: s.stat.name,
                value: s.base_stat,
            })
            .collect(),
        generation_name: generation_name(&generation.name),
        generation_label,
        name: pokemon.name,
    }
}

fn parse_listing(response: ListResponse) -> CatalogListing {
    let entries = response
        .results
        .into_iter()
        .filter_map(|r| {
            let id = id_from_resource_url(&r.url)?;
            Some(CatalogEntry {
                name: r.name.to_lowercase(),
                id,
            })
        })
        .collect();

    CatalogListing {
        count: response.count,
        entries,
    }
}

/// `https://pokeapi.co/api/v2/pokemon/25/` -> `25`
pub fn id_from_resource_url(url: &str) -> Option<u32> {
    url.trim_end_matches('/').rsplit('/').next()?.parse().ok()
}

pub fn generation_name(generation: &str) -> String {
    let games = match generation {
        "generation-i" => "Red/Blue/Yellow",
        "generation-ii" => "Gold/Silver/Crystal",
        "generation-iii" => "Ruby/Sapphire/Emerald",
        "generation-iv" => "Diamond/Pearl/Platinum",
        "generation-v" => "Black/White",
        "generation-vi" => "X/Y",
        "generation-vii" => "Sun/Moon",
        "generation-viii" => "Sword/Shield",
        "generation-ix" => "Scarlet/Violet",
        other => return other.trim_start_matches("generation-").to_uppercase(),
    };
    games.to_string()
}

pub fn to_roman(mut n: u32) -> String {
    const NUMERALS: [(u32, &str); 13] = [
        (1000, "M"),
        (900, "CM"),
        (500, "D"),
        (400, "CD"),
        (100, "C"),
        (90, "XC"),
        (50, "L"),
        (40, "XL"),
        (10, "X"),
        (9, "IX"),
        (5, "V"),
        (4, "IV"),
        (1, "I"),
    ];

    let mut out = String::new();
    for (value, numeral) in NUMERALS {
        while n >= value {
            out.push_str(numeral);
            n -= value;
        }
    }
    out
}

pub struct PokeApi {
    client: reqwest::Client,
    base_url: String,
}

impl PokeApi {
    pub fn new(base_url: &str) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("binder-tui/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, FetchError> {
        let response = self.client.get(url).send().await?.error_for_status()?;
        Ok(response.json().await?)
    }

    async fn get_pokemon(&self, id: u32) -> Result<PokemonResponse, FetchError> {
        self.get_json(&format!("{}/pokemon/{}", self.base_url, id))
            .await
    }

    async fn get_detail(&self, id: u32) -> Result<ItemDetail, FetchError> {
        let pokemon = self.get_pokemon(id).await?;
        let species: SpeciesResponse = self.get_json(&pokemon.species.url).await?;
        Ok(parse_detail(pokemon, species))
    }

    async fn get_image(&self, url: &str) -> Result<DynamicImage, FetchError> {
        let bytes = self
            .client
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await?;

        let image = image::ImageReader::new(Cursor::new(bytes))
            .with_guessed_format()
            .map_err(image::ImageError::IoError)?
            .decode()?;

        Ok(image.thumbnail(THUMBNAIL_SIZE, THUMBNAIL_SIZE))
    }
}

#[async_trait]
impl CatalogSource for PokeApi {
    async fn fetch_summary(&self, id: u32) -> Summary {
        match self.get_pokemon(id).await {
            Ok(pokemon) => Summary::Loaded(parse_summary(&pokemon)),
            Err(e) => {
                warn!("summary for #{} unavailable: {}", id, e);
                Summary::Unavailable { id }
            }
        }
    }

    async fn fetch_detail(&self, id: u32) -> Option<ItemDetail> {
        match self.get_detail(id).await {
            Ok(detail) => Some(detail),
            Err(e) => {
                warn!("details for #{} unavailable: {}", id, e);
                None
            }
        }
    }

    async fn fetch_listing(&self) -> Result<CatalogListing, FetchError> {
        let url = format!("{}/pokemon?limit={}", self.base_url, LISTING_LIMIT);
        let response: ListResponse = self.get_json(&url).await?;
        Ok(parse_listing(response))
    }

    async fn fetch_image(&self, url: &str) -> Option<DynamicImage> {
        match self.get_image(url).await {
            Ok(image) => Some(image),
            Err(e) => {
                debug!("image {} not preloaded: {}", url, e);
                None
            }
        }
    }
}
