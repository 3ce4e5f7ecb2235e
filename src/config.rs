//! Page text and chart styling.
//!
//! All fields have defaults, so a config file only needs the values it wants to change:
//!
//! ```toml
//! title = "Clinic visits 2021-2022"
//! header_image = "https://example.org/banner.jpeg"
//! year_palette = ["#6495ED", "#FFB6C1"]
//! ```
use crate::chart::parse_color;
use qu::ick_use::*;
use serde::Deserialize;
use std::{fs, path::Path};

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReportConfig {
    pub title: String,
    pub intro: String,
    /// Background image for the page header.
    pub header_image: Option<String>,
    /// One color per year in the sex chart.
    pub year_palette: Vec<String>,
    /// One color per year in the age group chart.
    pub age_palette: Vec<String>,
    pub monthly_color: String,
    /// Cycled over the bars of the top services chart.
    pub services_palette: Vec<String>,
    pub chart_width: u32,
    pub chart_height: u32,
    pub bar_opacity: f64,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            title: "Clinic visits report".into(),
            intro: "Analysis of visits to a medical clinic over two calendar years.".into(),
            header_image: None,
            year_palette: vec!["#6495ED".into(), "#FFB6C1".into()],
            age_palette: vec!["#90EE90".into(), "#FFCCCB".into()],
            monthly_color: "#FFCCCB".into(),
            // magma, light to dark
            services_palette: [
                "#FCFDBF", "#FEC98D", "#FD9567", "#F1605D", "#CD4071", "#9E2F7F", "#721F81",
                "#451077", "#180F3D", "#000004",
            ]
            .iter()
            .rev()
            .map(|c| c.to_string())
            .collect(),
            chart_width: 720,
            chart_height: 360,
            bar_opacity: 0.85,
        }
    }
}

impl ReportConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .with_context(|| format!("unable to read config \"{}\"", path.display()))?;
        Self::from_toml(&text).with_context(|| format!("in config \"{}\"", path.display()))
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result {
        ensure!(
            !self.year_palette.is_empty()
                && !self.age_palette.is_empty()
                && !self.services_palette.is_empty(),
            "palettes must contain at least one color"
        );
        for color in self
            .year_palette
            .iter()
            .chain(&self.age_palette)
            .chain(&self.services_palette)
            .chain([&self.monthly_color])
        {
            ensure!(
                parse_color(color).is_some(),
                "`{}` is not a `#RRGGBB` color",
                color
            );
        }
        ensure!(
            self.chart_width >= 200 && self.chart_height >= 150,
            "charts must be at least 200x150"
        );
        ensure!(
            (0. ..=1.).contains(&self.bar_opacity),
            "bar_opacity must be between 0 and 1"
        );
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::ReportConfig;

    #[test]
    fn empty_file_gives_defaults() {
        assert_eq!(ReportConfig::from_toml("").unwrap(), ReportConfig::default());
    }

    #[test]
    fn partial_override() {
        let config = ReportConfig::from_toml(
            r##"
title = "Visits"
year_palette = ["#000000", "#ffffff"]
"##,
        )
        .unwrap();
        assert_eq!(config.title, "Visits");
        assert_eq!(config.year_palette, ["#000000", "#ffffff"]);
        assert_eq!(config.chart_width, ReportConfig::default().chart_width);
    }

    #[test]
    fn rejects_bad_values() {
        assert!(ReportConfig::from_toml("bar_opacity = 2.0").is_err());
        assert!(ReportConfig::from_toml("year_palette = []").is_err());
        assert!(ReportConfig::from_toml("colour = \"red\"").is_err());
        assert!(ReportConfig::from_toml("monthly_color = \"red\"").is_err());
        assert!(ReportConfig::from_toml("age_palette = [\"#90EE90\", \"#12345\"]").is_err());
    }
}
