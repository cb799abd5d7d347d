//! Server-rendered HTML for the browser forms.

use crate::matcher::MatchResult;

/// One-shot user notices carried across a redirect in the `flash` cookie.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flash {
    NoFile,
    BadExtension,
    Unreadable,
    NotImage,
    BadName,
    Added,
}

impl Flash {
    pub fn code(self) -> &'static str {
        match self {
            Flash::NoFile => "no_file",
            Flash::BadExtension => "bad_extension",
            Flash::Unreadable => "unreadable",
            Flash::NotImage => "not_image",
            Flash::BadName => "bad_name",
            Flash::Added => "added",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        Some(match code {
            "no_file" => Flash::NoFile,
            "bad_extension" => Flash::BadExtension,
            "unreadable" => Flash::Unreadable,
            "not_image" => Flash::NotImage,
            "bad_name" => Flash::BadName,
            "added" => Flash::Added,
            _ => return None,
        })
    }

    pub fn message(self) -> &'static str {
        match self {
            Flash::NoFile => "No file selected.",
            Flash::BadExtension => "Unsupported file type. Use .jpg, .jpeg or .png.",
            Flash::Unreadable => "The uploaded image could not be read.",
            Flash::NotImage => "That file does not look like an image.",
            Flash::BadName => "Please give the fungus a name.",
            Flash::Added => "Entry added to the database.",
        }
    }

    fn is_error(self) -> bool {
        !matches!(self, Flash::Added)
    }
}

pub fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

fn layout(title: &str, body: &str) -> String {
    format!(
        "<!doctype html>\n<html><head><meta charset=\"utf-8\"><title>{}</title></head>\n<body>\n{}\n</body></html>\n",
        escape_html(title),
        body
    )
}

pub fn index(flash: Option<Flash>) -> String {
    let notice = match flash {
        Some(f) => format!(
            "<p class=\"flash {}\">{}</p>\n",
            if f.is_error() { "error" } else { "ok" },
            f.message()
        ),
        None => String::new(),
    };
    let body = format!(
        r#"<h1>Fungi Identifier</h1>
{notice}<h2>Identify</h2>
<form action="/identify" method="post" enctype="multipart/form-data">
  <input type="file" name="image" accept=".jpg,.jpeg,.png">
  <button type="submit">Identify</button>
</form>
<h2>Add to database</h2>
<form action="/add" method="post" enctype="multipart/form-data">
  <input type="text" name="name" placeholder="Name">
  <textarea name="description" placeholder="Description"></textarea>
  <input type="file" name="image" accept=".jpg,.jpeg,.png">
  <button type="submit">Add</button>
</form>
<p><a href="/about">About</a></p>"#
    );
    layout("Fungi Identifier", &body)
}

pub fn result(res: &MatchResult, uploaded_url: &str) -> String {
    let mut body = format!(
        "<h1>Result</h1>\n<p><img src=\"{}\" alt=\"uploaded\" width=\"256\"></p>\n",
        escape_html(uploaded_url)
    );
    if res.matched {
        let name = res.name.as_deref().unwrap_or_default();
        body.push_str(&format!("<h2>Match: {}</h2>\n", escape_html(name)));
        if let Some(img) = &res.image {
            body.push_str(&format!("<p><img src=\"{}\" alt=\"{}\" width=\"256\"></p>\n", escape_html(img), escape_html(name)));
        }
        if let Some(desc) = &res.description {
            body.push_str(&format!("<p class=\"description\">{}</p>\n", escape_html(desc)));
        }
    } else {
        body.push_str("<h2>No match found</h2>\n");
    }
    match res.score {
        Some(s) => body.push_str(&format!("<p>Hash difference: {s}</p>\n")),
        None => body.push_str("<p>Hash difference: n/a</p>\n"),
    }
    body.push_str("<p><a href=\"/\">Try another</a></p>");
    layout("Result", &body)
}

pub fn about() -> String {
    layout(
        "About",
        "<h2>Fungi Identifier Web App</h2><p>Matches photos against a reference collection by average-hash distance.</p>",
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flash_codes_round_trip() {
        for f in [Flash::NoFile, Flash::BadExtension, Flash::Unreadable, Flash::NotImage, Flash::BadName, Flash::Added] {
            assert_eq!(Flash::from_code(f.code()), Some(f));
        }
        assert_eq!(Flash::from_code("bogus"), None);
    }

    #[test]
    fn result_escapes_description() {
        let res = MatchResult {
            matched: true,
            name: Some("Amanita".into()),
            description: Some("<script>alert(1)</script>".into()),
            image: Some("/fungi_images/amanita.png".into()),
            score: Some(3),
        };
        let html = result(&res, "/uploads/x.png");
        assert!(html.contains("Match: Amanita"));
        assert!(html.contains("&lt;script&gt;"));
        assert!(!html.contains("<script>"));
        assert!(html.contains("Hash difference: 3"));
    }

    #[test]
    fn index_shows_flash() {
        assert!(index(Some(Flash::NoFile)).contains("No file selected."));
        assert!(!index(None).contains("class=\"flash"));
    }
}
