use std::{borrow::Cow, fmt, fmt::Write, fs, io, path::Path};

/// Converts a not found error to Ok(false)
pub fn path_exists(path: &Path) -> io::Result<bool> {
    match fs::metadata(path) {
        Ok(_) => Ok(true),
        Err(e) if matches!(e.kind(), io::ErrorKind::NotFound) => Ok(false),
        Err(e) => Err(e),
    }
}

// Something to make it easier to get custom data into the HTML report.

pub struct RowDrawer<'a> {
    output: &'a mut String,
    scratch: &'a mut String,
}

impl<'a> RowDrawer<'a> {
    fn cell(&mut self, content: impl fmt::Display) {
        self.output.push_str("<td>");
        self.scratch.clear();
        let _ = write!(self.scratch, "{}", content);
        html_escape::encode_text_to_string(&mut self.scratch, self.output);
        self.output.push_str("</td>");
    }
}

pub trait RowForDisplay {
    fn draw(&self, drawer: RowDrawer<'_>);
}

macro_rules! row_for_display_tuple {
    () => {};

    ($first_ty:ident $($rest_ty:ident)*) => {
        impl<$first_ty, $($rest_ty,)*> RowForDisplay for ($first_ty, $($rest_ty),*)
            where $first_ty: ::std::fmt::Display,
                  $(
                      $rest_ty: ::std::fmt::Display,
                  )*
        {
            fn draw(&self, mut drawer: RowDrawer<'_>) {
                #[allow(non_snake_case)]
                let (
                    ref $first_ty,
                    $(
                        ref $rest_ty
                    ),*
                ) = &self;
                drawer.cell($first_ty);
                $(
                    drawer.cell($rest_ty);
                )*
            }
        }

        row_for_display_tuple!($($rest_ty)*);
    };
}

row_for_display_tuple!(D1 D2 D3 D4 D5 D6);

/// A table that renders itself as an HTML fragment.
pub struct HtmlTable<Row, DR> {
    headers: Option<Vec<Cow<'static, str>>>,
    row_fn: Box<dyn Fn(&Row, usize) -> DR>,
    data: Vec<Row>,
}

impl<Row, DR> HtmlTable<Row, DR>
where
    DR: RowForDisplay,
{
    /// Create a new headerless table from row data and a function showing how to map that data
    /// to cells.
    pub fn new(
        data: impl IntoIterator<Item = Row>,
        row_fn: impl Fn(&Row, usize) -> DR + 'static,
    ) -> Self {
        HtmlTable {
            headers: None,
            row_fn: Box::new(row_fn),
            data: data.into_iter().collect(),
        }
    }

    pub fn with_headers(
        mut self,
        headers: impl IntoIterator<Item = impl Into<Cow<'static, str>>>,
    ) -> Self {
        self.headers = Some(headers.into_iter().map(Into::into).collect());
        self
    }

    /// Append this table as HTML to `output`.
    pub fn write_html(&self, output: &mut String) {
        output.push_str("<table>");
        if let Some(headers) = &self.headers {
            output.push_str("<thead><tr>");
            for header in headers {
                output.push_str("<th>");
                html_escape::encode_text_to_string(header, output);
                output.push_str("</th>");
            }
            output.push_str("</tr></thead>");
        }

        output.push_str("<tbody>");
        self.write_rows(output);
        output.push_str("</tbody></table>");
    }

    pub fn to_html(&self) -> String {
        let mut output = String::new();
        self.write_html(&mut output);
        output
    }

    fn write_rows(&self, output: &mut String) {
        let mut scratch = String::new();
        for (idx, row) in self.data.iter().enumerate() {
            output.push_str("<tr>");
            let drawer = RowDrawer {
                output,
                scratch: &mut scratch,
            };
            let to_draw = (self.row_fn)(row, idx);
            to_draw.draw(drawer);
            output.push_str("</tr>");
        }
    }
}

pub fn header(header: &str) {
    let len = header.chars().count();
    print!("\n{}\n", header);
    for _ in 0..len {
        print!("=");
    }
    println!("\n")
}
