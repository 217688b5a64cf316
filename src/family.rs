// src/family.rs

use serde::{Deserialize, Serialize};
use std::{fmt, path::PathBuf};
use url::Url;

/// ANP dataset that groups the "last four weeks" price surveys.
pub const DATASET_ID: &str = "d4524519-9657-4961-9f11-bc4142f53fa8";

const QUS_BASE: &str =
    "https://www.gov.br/anp/pt-br/centrais-de-conteudo/dados-abertos/arquivos/shpc/qus";

/// One of the three commodity families published by ANP.
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    clap::ValueEnum,
)]
#[serde(rename_all = "kebab-case")]
pub enum Family {
    Lpg,
    GasolineEthanol,
    DieselCng,
}

impl Family {
    pub const ALL: [Family; 3] = [Family::Lpg, Family::GasolineEthanol, Family::DieselCng];

    /// Stable identifier, used in history keys and config.
    pub fn as_str(&self) -> &'static str {
        match self {
            Family::Lpg => "lpg",
            Family::GasolineEthanol => "gasoline-ethanol",
            Family::DieselCng => "diesel-cng",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "lpg" => Some(Family::Lpg),
            "gasoline-ethanol" => Some(Family::GasolineEthanol),
            "diesel-cng" => Some(Family::DieselCng),
            _ => None,
        }
    }

    /// Prefix of every console status line.
    pub fn label(&self) -> &'static str {
        match self {
            Family::Lpg => "LPG",
            Family::GasolineEthanol => "Gasoline and Ethanol",
            Family::DieselCng => "Diesel and CNG",
        }
    }

    fn csv_name(&self) -> &'static str {
        match self {
            Family::Lpg => "ultimas-4-semanas-glp.csv",
            Family::GasolineEthanol => "ultimas-4-semanas-gasolina-etanol.csv",
            Family::DieselCng => "ultimas-4-semanas-diesel-gnv.csv",
        }
    }

    fn archive_name(&self) -> &'static str {
        match self {
            Family::Lpg => "LPG Prices.parquet",
            Family::GasolineEthanol => "Gasoline and Ethanol Prices.parquet",
            Family::DieselCng => "Diesel and CNG Prices.parquet",
        }
    }

    fn resource(&self) -> Resource {
        let (id, description, title) = match self {
            Family::Lpg => (
                "99fd78e2-233d-4385-9eb2-f06f1d874fcb",
                "Dados Abertos Quatro últimas semanas GLP P13.",
                "4 ultimas semanas glp",
            ),
            Family::GasolineEthanol => (
                "d483f3e7-837d-4d3d-ae7f-213050cd304d",
                "Dados Abertos Quatro últimas semanas Etanol Hidratado + Gasolina C.",
                "4 ultimas semanas gasolina etanol",
            ),
            Family::DieselCng => (
                "5e1d2c4b-8f4e-4b36-9b5b-620430c619b5",
                "Dados Abertos Quatro últimas semanas Óleo Diesel (S-500 e S-10) + GNV.",
                "4 ultimas semanas diesel gnv",
            ),
        };
        Resource {
            id: id.to_string(),
            dataset_id: DATASET_ID.to_string(),
            description: description.to_string(),
            title: title.to_string(),
        }
    }

    /// The built-in pipeline configuration for this family.
    pub fn default_spec(&self) -> FamilySpec {
        let url = Url::parse(&format!("{}/{}", QUS_BASE, self.csv_name()))
            .expect("static ANP url should parse");
        FamilySpec {
            family: *self,
            url,
            archive: PathBuf::from(self.archive_name()),
            resource: self.resource(),
        }
    }
}

impl fmt::Display for Family {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Portal metadata announced before a download.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Resource {
    pub id: String,
    pub dataset_id: String,
    pub description: String,
    pub title: String,
}

/// Everything one pipeline run needs to know about a family.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FamilySpec {
    pub family: Family,
    pub url: Url,
    /// Archive file, relative to the archive directory unless absolute.
    pub archive: PathBuf,
    pub resource: Resource,
}

impl FamilySpec {
    pub fn label(&self) -> &'static str {
        self.family.label()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_specs() {
        let lpg = Family::Lpg.default_spec();
        assert_eq!(lpg.label(), "LPG");
        assert_eq!(lpg.archive, PathBuf::from("LPG Prices.parquet"));
        assert!(lpg.url.as_str().ends_with("/qus/ultimas-4-semanas-glp.csv"));
        assert_eq!(lpg.resource.dataset_id, DATASET_ID);

        let diesel = Family::DieselCng.default_spec();
        assert_eq!(diesel.label(), "Diesel and CNG");
        assert_eq!(diesel.resource.title, "4 ultimas semanas diesel gnv");
    }

    #[test]
    fn test_identifier_round_trip() {
        for family in Family::ALL {
            assert_eq!(Family::from_str(family.as_str()), Some(family));
        }
        assert_eq!(Family::from_str(" LPG "), Some(Family::Lpg));
        assert_eq!(Family::from_str("kerosene"), None);
    }
}
