/*
 * SPDX-FileCopyrightText: 2020 Stalwart Labs LLC <hello@stalw.art>
 *
 * SPDX-License-Identifier: Apache-2.0 OR MIT
 */

#![no_main]
use libfuzzer_sys::fuzz_target;

use dkim_keyfinder::{
    arc,
    common::parse::{TagValueList, TxtRecordParser},
    common::verify::DomainKey,
    dkim, AuthenticatedMessage,
};

static RFC822_ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz:=- \r\n";
static TXT_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz1=;:";

fuzz_target!(|data: &[u8]| {
    let data_rfc822 = into_alphabet(data, RFC822_ALPHABET);
    let data_txt = into_alphabet(data, TXT_ALPHABET);

    TagValueList::decode(data).ok();
    TagValueList::decode(&data_txt).ok();

    dkim::Signature::parse(data).ok();
    dkim::Signature::parse(&data_txt).ok();

    arc::Signature::parse(data).ok();
    arc::Signature::parse(&data_txt).ok();

    arc::Seal::parse(data).ok();
    arc::Seal::parse(&data_txt).ok();

    arc::Results::parse(data).ok();
    arc::Results::parse(&data_txt).ok();

    AuthenticatedMessage::parse(data).ok();
    AuthenticatedMessage::parse(&data_rfc822).ok();

    DomainKey::parse(data).ok();
    DomainKey::parse(&data_txt).ok();
});

fn into_alphabet(data: &[u8], alphabet: &[u8]) -> Vec<u8> {
    data.iter()
        .map(|&byte| alphabet[byte as usize % alphabet.len()])
        .collect()
}
