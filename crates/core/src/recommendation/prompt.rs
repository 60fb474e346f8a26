use crate::domain::product::{Product, ProductId};
use crate::recommendation::MAX_RECOMMENDATIONS;

const MAX_WEATHER_EXAMPLES: usize = 3;
const PRODUCTS_PER_EXAMPLE: usize = 3;

struct ExampleScenario {
    tag: &'static str,
    title: &'static str,
    lead: &'static str,
    closing: &'static str,
}

const EXAMPLE_SCENARIOS: [ExampleScenario; 4] = [
    ExampleScenario {
        tag: "pluie",
        title: "Pluie",
        lead: "Sous la pluie, prends",
        closing: "Tu resteras au sec !",
    },
    ExampleScenario {
        tag: "soleil",
        title: "Soleil",
        lead: "Pour le soleil, je te recommande",
        closing: "Pense à bien t'hydrater !",
    },
    ExampleScenario {
        tag: "froid",
        title: "Froid",
        lead: "Par temps froid,",
        closing: "te garderont au chaud !",
    },
    ExampleScenario {
        tag: "vent",
        title: "Vent",
        lead: "Avec ce vent, mise sur",
        closing: "Protège bien tes extrémités !",
    },
];

/// Renders the catalogue as one line per product:
/// `ID: <id> | <name> | <price>€ | Tags: <tags> | <stock status>`.
pub fn format_catalog(products: &[Product]) -> String {
    if products.is_empty() {
        return "Aucun produit disponible dans le catalogue.".to_string();
    }

    let lines = products
        .iter()
        .map(|product| {
            let tags = if product.weather_tags.is_empty() {
                "Aucun".to_string()
            } else {
                product.weather_tags.iter().cloned().collect::<Vec<_>>().join(", ")
            };
            let stock = if product.is_in_stock() {
                format!("Stock: {}", product.stock_level)
            } else {
                "RUPTURE DE STOCK".to_string()
            };
            format!("ID: {} | {} | {}€ | Tags: {} | {}", product.id, product.name, product.price, tags, stock)
        })
        .collect::<Vec<_>>()
        .join("\n");

    format!("CATALOGUE PRODUITS DISPONIBLES :\n{lines}")
}

/// Builds the system instruction for one recommendation turn. Pure function of
/// the catalogue and the current weather/location.
pub fn build_system_prompt(products: &[Product], weather: &str, location: &str) -> String {
    let catalog = format_catalog(products);
    let examples = worked_examples(products)
        .into_iter()
        .map(|(title, json)| format!("{title} :\n{json}"))
        .collect::<Vec<_>>()
        .join("\n\n");

    format!(
        r#"Tu es Verronik, conseiller sportif expert pour un site e-commerce. RÉPONDS UNIQUEMENT EN JSON STRICT.

CONTEXTE ACTUEL (UTILISE-LE OBLIGATOIREMENT, MÊME SI LE CLIENT NE LE MENTIONNE PAS) :
- Localisation de l'utilisateur : "{location}"
- Météo prévue : "{weather}"

RÈGLES STRICTES :
1. Adapte TOUTES tes recommandations à la météo "{weather}" à "{location}"
2. Recommande UNIQUEMENT des produits du catalogue ci-dessous
3. JAMAIS de produit marqué RUPTURE DE STOCK
4. Maximum {max} produits recommandés
5. Ne mentionne JAMAIS les IDs dans le texte, seulement dans recommended_ids
6. Utilise les NOMS EXACTS des produits dans ta réponse
7. INTERDIT : pas de commentaires (//) dans le JSON, pas de texte avant ou après

{catalog}

FORMAT OBLIGATOIRE : un objet JSON avec exactement deux clés, "reply" (texte) et "recommended_ids" (tableau d'au plus {max} entiers), sans commentaire :
{{"reply":"Ta réponse courte et sympathique avec les NOMS des produits","recommended_ids":[1,2]}}

EXEMPLES CORRECTS :

{examples}

IMPORTANT :
- Réponds UNIQUEMENT avec le JSON compact, sur une seule ligne
- AUCUN commentaire (//), AUCUN texte explicatif"#,
        max = MAX_RECOMMENDATIONS,
    )
}

/// Two to four examples drawn from the catalogue itself so the ids they cite
/// exist and are in stock.
fn worked_examples(products: &[Product]) -> Vec<(String, String)> {
    let mut examples = EXAMPLE_SCENARIOS
        .iter()
        .filter_map(|scenario| {
            let picks = products
                .iter()
                .filter(|product| product.is_in_stock() && product.has_weather_tag(scenario.tag))
                .take(PRODUCTS_PER_EXAMPLE)
                .collect::<Vec<_>>();
            if picks.is_empty() {
                return None;
            }

            let names = join_names(picks.iter().map(|product| product.name.as_str()).collect());
            let reply = format!("{} {} {}", scenario.lead, names, scenario.closing);
            let ids = picks.iter().map(|product| product.id).collect::<Vec<_>>();
            Some((scenario.title.to_string(), compact_json(&reply, &ids)))
        })
        .take(MAX_WEATHER_EXAMPLES)
        .collect::<Vec<_>>();

    if examples.is_empty() {
        examples.push((
            "Salutation".to_string(),
            compact_json(
                "Bonjour ! Dis-moi ton activité et la météo prévue, je te conseillerai l'équipement idéal.",
                &[],
            ),
        ));
    }
    examples.push((
        "Demande hors catalogue".to_string(),
        compact_json("Je n'ai pas de produit adapté à cette demande dans le catalogue.", &[]),
    ));

    examples
}

fn join_names(names: Vec<&str>) -> String {
    match names.split_last() {
        None => String::new(),
        Some((last, [])) => (*last).to_string(),
        Some((last, rest)) => format!("{} et {}", rest.join(", "), last),
    }
}

/// Keeps `reply` before `recommended_ids`, which `serde_json::Map` would not.
fn compact_json(reply: &str, ids: &[ProductId]) -> String {
    let reply = serde_json::Value::String(reply.to_string()).to_string();
    let ids = ids.iter().map(ToString::to_string).collect::<Vec<_>>().join(",");
    format!(r#"{{"reply":{reply},"recommended_ids":[{ids}]}}"#)
}
