// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Rewriting of publisher identities in package manifests.

A package's declared publisher must match the subject of the certificate
that signs it. `AppxManifest.xml` declares it on the `Identity` element.
`.appinstaller` files declare it on `MainPackage` or `MainBundle`.
*/

use {
    crate::error::SigningError,
    std::path::Path,
    xml::{
        reader::{EventReader, ParserConfig, XmlEvent as ReaderEvent},
        writer::EmitterConfig,
    },
};

/// Name of the manifest inside an unpacked APPX package.
pub const APPX_MANIFEST: &str = "AppxManifest.xml";

/// Elements of `AppxManifest.xml` carrying the publisher.
pub const APPX_PUBLISHER_ELEMENTS: &[&str] = &["Identity"];

/// Elements of `.appinstaller` files carrying the publisher.
pub const APP_INSTALLER_PUBLISHER_ELEMENTS: &[&str] = &["MainBundle", "MainPackage"];

/// Set the `Publisher` attribute on elements with the given local names.
///
/// Everything else in the document is written back unchanged. Returns the
/// new document and the number of elements rewritten.
pub fn rewrite_publisher(
    data: &[u8],
    elements: &[&str],
    publisher: &str,
) -> Result<(Vec<u8>, usize), SigningError> {
    let reader = EventReader::new_with_config(
        data,
        ParserConfig::new()
            .trim_whitespace(false)
            .whitespace_to_characters(true)
            .cdata_to_characters(false),
    );

    let mut output = Vec::with_capacity(data.len());
    let mut writer = EmitterConfig::new()
        .perform_indent(false)
        .write_document_declaration(false)
        .create_writer(&mut output);

    let mut count = 0;

    for event in reader {
        let mut event = event?;

        if let ReaderEvent::StartElement {
            name, attributes, ..
        } = &mut event
        {
            if elements.contains(&name.local_name.as_str()) {
                for attribute in attributes.iter_mut() {
                    if attribute.name.prefix.is_none() && attribute.name.local_name == "Publisher"
                    {
                        attribute.value = publisher.to_string();
                        count += 1;
                    }
                }
            }
        }

        if let Some(event) = event.as_writer_event() {
            writer.write(event)?;
        }
    }

    Ok((output, count))
}

/// Rewrite the publisher in a manifest file in place.
pub fn rewrite_publisher_file(
    path: &Path,
    elements: &[&str],
    publisher: &str,
) -> Result<usize, SigningError> {
    let data = std::fs::read(path)?;
    let (data, count) = rewrite_publisher(&data, elements, publisher)?;

    if count > 0 {
        std::fs::write(path, data)?;
    }

    Ok(count)
}
