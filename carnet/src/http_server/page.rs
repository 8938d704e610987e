use crate::verify::{format_date, Verdict, Verification};
use chrono::NaiveDateTime;

/// Escape text for use inside html element content and quoted attributes
pub fn html_escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
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

fn row(label: &str, value: Option<&str>) -> String {
    format!(
        "<div class=\"row\"><span class=\"label\">{}</span><span>{}</span></div>\n",
        label,
        html_escape(value.unwrap_or("-"))
    )
}

fn title(verdict: Verdict) -> &'static str {
    match verdict {
        Verdict::Valid => "Carnet Vigente",
        Verdict::Expired => "Carnet Vencido",
        Verdict::Revoked => "Código QR Revocado",
        Verdict::Invalid => "Código QR No Válido",
    }
}

/// Render the human facing verification page. Worker fields appear only
/// for verdicts that may disclose them.
pub fn render(verification: &Verification, checked_at: NaiveDateTime) -> String {
    let mut body = String::new();
    body.push_str(&format!("<h1>{}</h1>\n", title(verification.verdict)));

    match (&verification.worker, verification.verdict.shows_worker()) {
        (Some(worker), true) => {
            if let Some(url) = &worker.photo_url {
                body.push_str(&format!(
                    "<img class=\"photo\" src=\"{}\" alt=\"{}\">\n",
                    html_escape(url),
                    html_escape(&worker.full_name())
                ));
            }
            body.push_str(&format!(
                "<h2>{}</h2>\n<p class=\"id\">ID: {}</p>\n",
                html_escape(&worker.full_name()),
                html_escape(&worker.internal_id)
            ));
            body.push_str(&row("Cargo", Some(&worker.position)));
            body.push_str(&row("Departamento", Some(&worker.department)));
            body.push_str(&row("Cédula", Some(&worker.cedula)));
            body.push_str(&row("Teléfono", worker.phone.as_deref()));
            body.push_str(&row("Correo", worker.email.as_deref()));
            body.push_str(&row("Estado", Some(worker.status.as_str())));
            body.push_str(&format!(
                "<p class=\"message\">{}</p>\n",
                html_escape(&verification.message)
            ));
            if verification.verdict == Verdict::Expired {
                body.push_str(
                    "<p>Por favor, contacte al administrador para renovar el carnet.</p>\n",
                );
            }
        }
        _ => body.push_str(&format!(
            "<p class=\"message\">{}</p>\n",
            html_escape(&verification.message)
        )),
    }

    format!(
        "<!DOCTYPE html>\n<html lang=\"es\">\n<head>\n<meta charset=\"utf-8\">\n\
         <meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">\n\
         <title>{title}</title>\n</head>\n<body class=\"{class}\">\n{body}\
         <footer>Verificación realizada el {date} a las {time}</footer>\n</body>\n</html>\n",
        title = title(verification.verdict),
        class = verification.verdict.as_str().to_lowercase(),
        body = body,
        date = format_date(checked_at.date()),
        time = checked_at.format("%H:%M"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::fixtures::worker;
    use crate::verify::PublicWorker;
    use chrono::NaiveDate;
    use entity::WorkerStatus;

    fn checked_at() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 6, 10)
            .unwrap()
            .and_hms_opt(9, 30, 0)
            .unwrap()
    }

    #[test]
    fn escapes_markup() {
        assert_eq!(
            html_escape("<script>alert('x') & \"y\"</script>"),
            "&lt;script&gt;alert(&#39;x&#39;) &amp; &quot;y&quot;&lt;/script&gt;"
        );
    }

    #[test]
    fn valid_page_shows_escaped_worker() {
        let mut w = worker("w", WorkerStatus::Activo, NaiveDate::from_ymd_opt(2030, 1, 1).unwrap());
        w.first_name = "<b>Ana</b>".to_owned();
        let v = Verification {
            verdict: Verdict::Valid,
            message: "Carnet vigente hasta el 01/01/2030".to_owned(),
            worker: Some(PublicWorker::from(&w)),
            expired_on: None,
        };
        let html = render(&v, checked_at());
        assert!(html.contains("&lt;b&gt;Ana&lt;/b&gt;"));
        assert!(!html.contains("<b>Ana</b>"));
        assert!(html.contains(&w.internal_id));
        assert!(html.contains("Verificación realizada el 10/06/2024 a las 09:30"));
    }

    #[test]
    fn revoked_page_hides_worker_even_if_present() {
        let w = worker("w", WorkerStatus::Activo, NaiveDate::from_ymd_opt(2030, 1, 1).unwrap());
        let mut v = Verification::revoked();
        v.worker = Some(PublicWorker::from(&w));
        let html = render(&v, checked_at());
        assert!(html.contains("Código QR Revocado"));
        assert!(!html.contains(&w.cedula));
    }
}
