//! Bar charts rendered as standalone SVG fragments with `plotters`.
//!
//! Two shapes are needed by the report: vertical bars, optionally grouped by series (one series
//! per year), and horizontal bars for long category names. Axis scaling picks a "nice" tick step
//! of 1, 2 or 5 times a power of ten.
use plotters::{
    chart::{ChartContext, SeriesAnno},
    coord::{cartesian::Cartesian2d, types::RangedCoordf64, Shift},
    prelude::*,
};
use qu::ick_use::*;

const FONT: &str = "sans-serif";

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Orientation {
    /// Categories along the x axis, bars grow upwards.
    Vertical,
    /// Categories along the y axis, bars grow to the right.
    Horizontal,
}

/// One set of bars. `values` lines up with the chart's categories.
#[derive(Debug, Clone)]
pub struct Series {
    /// Shown in the legend. Single-series charts have no legend.
    pub name: String,
    /// Colors are cycled per bar when there is more than one, otherwise the series has one
    /// color.
    pub colors: Vec<String>,
    pub values: Vec<usize>,
}

impl Series {
    pub fn new(name: impl Into<String>, color: impl Into<String>, values: Vec<usize>) -> Self {
        Self {
            name: name.into(),
            colors: vec![color.into()],
            values,
        }
    }

    fn rgb(&self, idx: usize) -> RGBColor {
        if self.colors.is_empty() {
            return RGBColor(128, 128, 128);
        }
        parse_color(&self.colors[idx % self.colors.len()]).unwrap_or(RGBColor(128, 128, 128))
    }
}

#[derive(Debug, Clone)]
pub struct BarChart {
    pub title: String,
    pub x_label: String,
    pub y_label: String,
    pub legend_title: Option<String>,
    pub orientation: Orientation,
    pub categories: Vec<String>,
    pub series: Vec<Series>,
    pub width: u32,
    pub height: u32,
    pub opacity: f64,
    /// Turn category labels sideways. Only used for vertical charts.
    pub rotate_labels: bool,
}

impl BarChart {
    pub fn new(title: impl Into<String>, orientation: Orientation) -> Self {
        Self {
            title: title.into(),
            x_label: String::new(),
            y_label: String::new(),
            legend_title: None,
            orientation,
            categories: Vec::new(),
            series: Vec::new(),
            width: 720,
            height: 360,
            opacity: 0.85,
            rotate_labels: false,
        }
    }

    pub fn with_labels(mut self, x_label: impl Into<String>, y_label: impl Into<String>) -> Self {
        self.x_label = x_label.into();
        self.y_label = y_label.into();
        self
    }

    pub fn with_legend(mut self, title: impl Into<String>) -> Self {
        self.legend_title = Some(title.into());
        self
    }

    pub fn with_categories(mut self, categories: impl IntoIterator<Item = impl ToString>) -> Self {
        self.categories = categories.into_iter().map(|c| c.to_string()).collect();
        self
    }

    pub fn with_series(mut self, series: Series) -> Self {
        self.series.push(series);
        self
    }

    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    pub fn with_opacity(mut self, opacity: f64) -> Self {
        self.opacity = opacity;
        self
    }

    pub fn with_rotated_labels(mut self) -> Self {
        self.rotate_labels = true;
        self
    }

    pub fn max_value(&self) -> usize {
        self.series
            .iter()
            .flat_map(|s| s.values.iter().copied())
            .max()
            .unwrap_or(0)
    }

    fn has_legend(&self) -> bool {
        self.legend_title.is_some() && self.series.len() > 1
    }

    /// Render the chart as an `<svg>` element.
    pub fn to_svg(&self) -> Result<String> {
        let mut out = String::new();
        {
            let root =
                SVGBackend::with_string(&mut out, (self.width, self.height)).into_drawing_area();
            root.fill(&WHITE)?;
            match self.orientation {
                Orientation::Vertical => self.draw_vertical(&root)?,
                Orientation::Horizontal => self.draw_horizontal(&root)?,
            }
            root.present()?;
        }
        Ok(out)
    }

    fn draw_vertical(&self, root: &DrawingArea<SVGBackend<'_>, Shift>) -> Result {
        let (top, step) = nice_scale(self.max_value());
        let n_cat = self.categories.len().max(1);
        let categories = &self.categories;
        let mut chart = ChartBuilder::on(root)
            .caption(&self.title, (FONT, 18))
            .margin(12)
            .x_label_area_size(if self.rotate_labels { 70 } else { 40 })
            .y_label_area_size(56)
            .build_cartesian_2d(-0.5f64..n_cat as f64 - 0.5, 0f64..top as f64)?;

        let label_font = if self.rotate_labels {
            (FONT, 11).into_font().transform(FontTransform::Rotate90)
        } else {
            (FONT, 11).into_font()
        };
        chart
            .configure_mesh()
            .disable_x_mesh()
            .light_line_style(&WHITE.mix(0.))
            .bold_line_style(&BLACK.mix(0.15))
            .x_labels(n_cat)
            .x_label_style(label_font)
            .x_label_formatter(&|x| category_label(categories, *x, false))
            .y_labels(top / step + 1)
            .y_label_formatter(&|y| format!("{:.0}", y))
            .x_desc(self.x_label.as_str())
            .y_desc(self.y_label.as_str())
            .draw()?;

        let bar_w = 0.8 / self.series.len().max(1) as f64;
        for (s_idx, series) in self.series.iter().enumerate() {
            let single = self.series.len() == 1;
            let bars = series
                .values
                .iter()
                .take(self.categories.len())
                .enumerate()
                .map(|(cat_idx, &value)| {
                    let x0 = cat_idx as f64 - 0.4 + bar_w * s_idx as f64;
                    let color = series.rgb(if single { cat_idx } else { 0 });
                    Rectangle::new(
                        [(x0, 0.), (x0 + bar_w, value as f64)],
                        color.mix(self.opacity).filled(),
                    )
                });
            let anno = chart.draw_series(bars)?;
            self.legend_entry(anno, series);
        }
        self.draw_legend(&mut chart)
    }

    fn draw_horizontal(&self, root: &DrawingArea<SVGBackend<'_>, Shift>) -> Result {
        let (top, step) = nice_scale(self.max_value());
        let n_cat = self.categories.len().max(1);
        let categories = &self.categories;
        let longest = categories.iter().map(|c| c.chars().count()).max().unwrap_or(0);
        let label_area = (longest as f64 * 6.5 + 24.).clamp(64., self.width as f64 * 0.45);
        let mut chart = ChartBuilder::on(root)
            .caption(&self.title, (FONT, 18))
            .margin(12)
            .x_label_area_size(40)
            .y_label_area_size(label_area as u32)
            .build_cartesian_2d(0f64..top as f64, -0.5f64..n_cat as f64 - 0.5)?;

        chart
            .configure_mesh()
            .disable_y_mesh()
            .light_line_style(&WHITE.mix(0.))
            .bold_line_style(&BLACK.mix(0.15))
            .x_labels(top / step + 1)
            .x_label_formatter(&|x| format!("{:.0}", x))
            .y_labels(n_cat)
            .y_label_style((FONT, 11))
            .y_label_formatter(&|y| category_label(categories, *y, true))
            .x_desc(self.y_label.as_str())
            .y_desc(self.x_label.as_str())
            .draw()?;

        // first category at the top
        let bar_h = 0.8 / self.series.len().max(1) as f64;
        for (s_idx, series) in self.series.iter().enumerate() {
            let single = self.series.len() == 1;
            let bars = series
                .values
                .iter()
                .take(self.categories.len())
                .enumerate()
                .map(|(cat_idx, &value)| {
                    let y1 = (n_cat - 1 - cat_idx) as f64 + 0.4 - bar_h * s_idx as f64;
                    let color = series.rgb(if single { cat_idx } else { 0 });
                    Rectangle::new(
                        [(0., y1 - bar_h), (value as f64, y1)],
                        color.mix(self.opacity).filled(),
                    )
                });
            let anno = chart.draw_series(bars)?;
            self.legend_entry(anno, series);
        }
        self.draw_legend(&mut chart)
    }

    fn legend_entry(&self, anno: &mut SeriesAnno<'_, SVGBackend<'_>>, series: &Series) {
        if !self.has_legend() {
            return;
        }
        let label = match &self.legend_title {
            Some(title) => format!("{}: {}", title, series.name),
            None => series.name.clone(),
        };
        let color = series.rgb(0).mix(self.opacity);
        anno.label(label)
            .legend(move |(x, y)| Rectangle::new([(x, y - 5), (x + 12, y + 5)], color.filled()));
    }

    fn draw_legend<'a, 'b: 'a>(
        &self,
        chart: &mut ChartContext<'a, SVGBackend<'b>, Cartesian2d<RangedCoordf64, RangedCoordf64>>,
    ) -> Result {
        if self.has_legend() {
            chart
                .configure_series_labels()
                .position(SeriesLabelPosition::UpperRight)
                .label_font((FONT, 12))
                .background_style(&WHITE.mix(0.8))
                .border_style(&BLACK)
                .draw()?;
        }
        Ok(())
    }
}

/// The category centred on `pos`, or nothing between categories. With `reversed` the first
/// category sits at the highest position.
fn category_label(categories: &[String], pos: f64, reversed: bool) -> String {
    let idx = pos.round();
    if (pos - idx).abs() > 1e-6 || idx < 0. || idx as usize >= categories.len() {
        return String::new();
    }
    let idx = if reversed {
        categories.len() - 1 - idx as usize
    } else {
        idx as usize
    };
    categories[idx].clone()
}

/// Parse a `#RRGGBB` color.
pub fn parse_color(color: &str) -> Option<RGBColor> {
    let hex = color.strip_prefix('#')?;
    if hex.len() != 6 || !hex.is_ascii() {
        return None;
    }
    let channel = |idx: usize| u8::from_str_radix(&hex[idx..idx + 2], 16).ok();
    Some(RGBColor(channel(0)?, channel(2)?, channel(4)?))
}

/// Pick an axis maximum and tick step for values up to `max`.
///
/// Aims for about five ticks. The returned maximum is a multiple of the step and is never zero.
pub fn nice_scale(max: usize) -> (usize, usize) {
    if max == 0 {
        return (1, 1);
    }
    let raw = max as f64 / 5.;
    let magnitude = 10f64.powi(raw.log10().floor() as i32);
    let step = [1., 2., 5., 10.]
        .iter()
        .map(|m| m * magnitude)
        .find(|s| *s >= raw)
        .unwrap_or(10. * magnitude)
        .max(1.) as usize;
    let top = ((max + step - 1) / step) * step;
    (top, step)
}

#[cfg(test)]
mod test {
    use super::{category_label, nice_scale, parse_color, BarChart, Orientation, Series};
    use plotters::style::RGBColor;

    #[test]
    fn scales() {
        assert_eq!(nice_scale(0), (1, 1));
        assert_eq!(nice_scale(3), (3, 1));
        assert_eq!(nice_scale(10), (10, 2));
        assert_eq!(nice_scale(47), (50, 10));
        assert_eq!(nice_scale(1234), (1500, 500));
    }

    #[test]
    fn colors() {
        let RGBColor(r, g, b) = parse_color("#FFB6C1").unwrap();
        assert_eq!((r, g, b), (0xff, 0xb6, 0xc1));
        let RGBColor(r, g, b) = parse_color("#6495ed").unwrap();
        assert_eq!((r, g, b), (0x64, 0x95, 0xed));
        assert!(parse_color("red").is_none());
        assert!(parse_color("#FFF").is_none());
        assert!(parse_color("#GG0000").is_none());
    }

    #[test]
    fn labels_sit_on_category_centres() {
        let cats = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        assert_eq!(category_label(&cats, 0., false), "a");
        assert_eq!(category_label(&cats, 2.0000000001, false), "c");
        assert_eq!(category_label(&cats, 0.5, false), "");
        assert_eq!(category_label(&cats, -1., false), "");
        assert_eq!(category_label(&cats, 3., false), "");
        assert_eq!(category_label(&cats, 2., true), "a");
        assert_eq!(category_label(&cats, 0., true), "c");
    }

    #[test]
    fn grouped_bars() {
        let chart = BarChart::new("Patients by sex", Orientation::Vertical)
            .with_labels("Sex", "Patients")
            .with_legend("Year")
            .with_categories(["Men", "Women"])
            .with_series(Series::new("2021", "#6495ED", vec![3, 5]))
            .with_series(Series::new("2022", "#FFB6C1", vec![4, 9]));
        let svg = chart.to_svg().unwrap();
        assert!(svg.contains("<svg"));
        assert!(svg.contains("</svg>"));
        assert!(svg.contains("Patients by sex"));
        assert!(svg.contains("Women"));
        assert!(svg.contains("Year: 2022"));
        assert!(svg.contains("#FFB6C1"));
        assert!(svg.contains("#6495ED"));
    }

    #[test]
    fn single_series_has_no_legend() {
        let chart = BarChart::new("Top services", Orientation::Horizontal)
            .with_legend("Year")
            .with_categories(["X-ray <chest>", "ECG"])
            .with_series(Series {
                name: "2022".into(),
                colors: vec!["#000004".into(), "#FCFDBF".into()],
                values: vec![7, 2],
            });
        let svg = chart.to_svg().unwrap();
        assert!(!svg.contains("Year: 2022"));
        assert!(!svg.contains("<chest>"));
        assert!(svg.contains("ECG"));
        // colors cycle per bar in a single-series chart
        assert!(svg.contains("#000004"));
        assert!(svg.contains("#FCFDBF"));
    }

    #[test]
    fn empty_chart_renders() {
        let svg = BarChart::new("Nothing", Orientation::Vertical).to_svg().unwrap();
        assert!(svg.contains("Nothing"));
        let svg = BarChart::new("Nothing", Orientation::Horizontal).to_svg().unwrap();
        assert!(svg.contains("</svg>"));
    }
}
