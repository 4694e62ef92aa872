//! Single-pass streaming MPD parser.
//!
//! Elements are consumed in document order. Representations are collected per adaptation set
//! and only turned into concrete segment lists when the set closes, so that addressing
//! information declared at adaptation set or period scope is fully known by then.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use tracing::{debug, trace};
use url::Url;

use crate::error::ParseError;
use crate::mpd::template::{resolve, TemplateVars};
use crate::mpd::{
    parse_ratio, parse_xs_duration_us, scale_from_us, scale_to_us, AdaptationSet, ByteRange,
    Period, Presentation, Representation, Segment,
};

/// Parses a static MPD. `base_url` is the location the manifest was fetched from.
pub fn parse_mpd(bytes: &[u8], base_url: &Url) -> Result<Presentation, ParseError> {
    let mut reader = Reader::from_reader(bytes);
    reader.config_mut().trim_text(true);

    let mut parser = MpdParser::new(base_url.clone());
    let mut stack: Vec<String> = Vec::new();
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => {
                stack.push(String::from_utf8_lossy(e.local_name().as_ref()).into_owned());
                parser.open(&e)?;
            }
            Event::Empty(e) => {
                parser.open(&e)?;
                parser.close(e.local_name().as_ref())?;
            }
            Event::End(e) => {
                stack.pop();
                parser.close(e.local_name().as_ref())?;
            }
            Event::Text(t) => parser.text(&t.unescape()?),
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    if let Some(open) = stack.last() {
        return Err(ParseError::Malformed(format!(
            "document ended inside <{open}>"
        )));
    }

    parser.finish()
}

#[derive(Debug, Clone, Copy)]
struct TimelineEntry {
    t: Option<u64>,
    d: u64,
    r: i64,
}

#[derive(Debug, Clone, Default)]
struct TemplateAttrs {
    media: Option<String>,
    initialization: Option<String>,
    start_number: Option<u64>,
    timescale: Option<u64>,
    duration: Option<u64>,
    presentation_time_offset: Option<u64>,
    timeline: Option<Vec<TimelineEntry>>,
}

impl TemplateAttrs {
    /// Fills unset fields from `parent`.
    fn inherit(self, parent: &TemplateAttrs) -> TemplateAttrs {
        TemplateAttrs {
            media: self.media.or_else(|| parent.media.clone()),
            initialization: self.initialization.or_else(|| parent.initialization.clone()),
            start_number: self.start_number.or(parent.start_number),
            timescale: self.timescale.or(parent.timescale),
            duration: self.duration.or(parent.duration),
            presentation_time_offset: self
                .presentation_time_offset
                .or(parent.presentation_time_offset),
            timeline: self.timeline.or_else(|| parent.timeline.clone()),
        }
    }
}

/// A `sourceURL`/`media` reference plus its optional range.
#[derive(Debug, Clone, Default)]
struct UrlRef {
    url: Option<String>,
    range: Option<ByteRange>,
}

#[derive(Debug, Clone, Default)]
struct SegmentListAttrs {
    timescale: Option<u64>,
    duration: Option<u64>,
    initialization: Option<UrlRef>,
    urls: Vec<UrlRef>,
}

#[derive(Debug, Clone, Default)]
struct SegmentBaseAttrs {
    initialization: Option<UrlRef>,
}

#[derive(Debug, Clone, Default)]
struct Addressing {
    template: Option<TemplateAttrs>,
    list: Option<SegmentListAttrs>,
    base: Option<SegmentBaseAttrs>,
}

struct PeriodState {
    id: Option<String>,
    start_us: u64,
    duration_us: Option<u64>,
    base_url: Url,
    addressing: Addressing,
    sets: Vec<Arc<AdaptationSet>>,
}

struct SetState {
    group: Option<u32>,
    mime_type: Option<String>,
    codecs: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    sar: Option<f64>,
    max_width: Option<u32>,
    max_height: Option<u32>,
    par: Option<f64>,
    base_url: Url,
    addressing: Addressing,
    reps: Vec<RepState>,
}

struct RepState {
    id: String,
    bandwidth: u64,
    mime_type: Option<String>,
    codecs: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    sar: Option<f64>,
    base_url: Url,
    addressing: Addressing,
}

struct MpdParser {
    base_url: Url,
    seen_mpd: bool,
    duration_us: u64,
    min_buffer_time_us: u64,
    periods: Vec<Period>,
    period: Option<PeriodState>,
    set: Option<SetState>,
    rep: Option<RepState>,
    open_template: Option<TemplateAttrs>,
    open_list: Option<SegmentListAttrs>,
    open_base: Option<SegmentBaseAttrs>,
    base_url_text: Option<String>,
    next_set_key: usize,
}

impl MpdParser {
    fn new(base_url: Url) -> Self {
        Self {
            base_url,
            seen_mpd: false,
            duration_us: 0,
            min_buffer_time_us: 0,
            periods: Vec::new(),
            period: None,
            set: None,
            rep: None,
            open_template: None,
            open_list: None,
            open_base: None,
            base_url_text: None,
            next_set_key: 0,
        }
    }

    fn open(&mut self, e: &BytesStart<'_>) -> Result<(), ParseError> {
        match e.local_name().as_ref() {
            b"MPD" => self.open_mpd(&Attributes::collect("MPD", e)?),
            b"Period" => self.open_period(&Attributes::collect("Period", e)?),
            b"AdaptationSet" => self.open_set(&Attributes::collect("AdaptationSet", e)?),
            b"Representation" => self.open_rep(&Attributes::collect("Representation", e)?),
            b"BaseURL" => {
                self.base_url_text = Some(String::new());
                Ok(())
            }
            b"SegmentTemplate" => {
                let attrs = Attributes::collect("SegmentTemplate", e)?;
                self.open_template = Some(TemplateAttrs {
                    media: attrs.get("media").map(str::to_string),
                    initialization: attrs.get("initialization").map(str::to_string),
                    start_number: attrs.parse("startNumber")?,
                    timescale: attrs.parse("timescale")?,
                    duration: attrs.parse("duration")?,
                    presentation_time_offset: attrs.parse("presentationTimeOffset")?,
                    timeline: None,
                });
                Ok(())
            }
            b"SegmentTimeline" => {
                if let Some(template) = self.open_template.as_mut() {
                    template.timeline = Some(Vec::new());
                }
                Ok(())
            }
            b"S" => {
                let attrs = Attributes::collect("S", e)?;
                let entry = TimelineEntry {
                    t: attrs.parse("t")?,
                    d: attrs.require_parsed("d")?,
                    r: attrs.parse("r")?.unwrap_or(0),
                };
                match self
                    .open_template
                    .as_mut()
                    .and_then(|template| template.timeline.as_mut())
                {
                    Some(timeline) => {
                        timeline.push(entry);
                        Ok(())
                    }
                    None => Err(ParseError::Malformed(
                        "<S> outside of <SegmentTimeline>".to_string(),
                    )),
                }
            }
            b"SegmentList" => {
                let attrs = Attributes::collect("SegmentList", e)?;
                self.open_list = Some(SegmentListAttrs {
                    timescale: attrs.parse("timescale")?,
                    duration: attrs.parse("duration")?,
                    ..Default::default()
                });
                Ok(())
            }
            b"SegmentBase" => {
                self.open_base = Some(SegmentBaseAttrs::default());
                Ok(())
            }
            b"Initialization" => {
                let attrs = Attributes::collect("Initialization", e)?;
                let init = UrlRef {
                    url: attrs.get("sourceURL").map(str::to_string),
                    range: attrs.range("range")?,
                };
                if let Some(list) = self.open_list.as_mut() {
                    list.initialization = Some(init);
                } else if let Some(base) = self.open_base.as_mut() {
                    base.initialization = Some(init);
                }
                Ok(())
            }
            b"SegmentURL" => {
                let attrs = Attributes::collect("SegmentURL", e)?;
                match self.open_list.as_mut() {
                    Some(list) => {
                        list.urls.push(UrlRef {
                            url: attrs.get("media").map(str::to_string),
                            range: attrs.range("mediaRange")?,
                        });
                        Ok(())
                    }
                    None => Err(ParseError::Malformed(
                        "<SegmentURL> outside of <SegmentList>".to_string(),
                    )),
                }
            }
            _ => Ok(()),
        }
    }

    fn close(&mut self, name: &[u8]) -> Result<(), ParseError> {
        match name {
            b"BaseURL" => {
                if let Some(text) = self.base_url_text.take() {
                    let scope = self.innermost_base_url();
                    *scope = scope.join(text.trim())?;
                }
            }
            b"SegmentTemplate" => {
                if let Some(template) = self.open_template.take() {
                    if let Some(addressing) = self.innermost_addressing() {
                        addressing.template = Some(template);
                    }
                }
            }
            b"SegmentList" => {
                if let Some(list) = self.open_list.take() {
                    if let Some(addressing) = self.innermost_addressing() {
                        addressing.list = Some(list);
                    }
                }
            }
            b"SegmentBase" => {
                if let Some(base) = self.open_base.take() {
                    if let Some(addressing) = self.innermost_addressing() {
                        addressing.base = Some(base);
                    }
                }
            }
            b"Representation" => {
                if let (Some(rep), Some(set)) = (self.rep.take(), self.set.as_mut()) {
                    set.reps.push(rep);
                }
            }
            b"AdaptationSet" => self.close_set()?,
            b"Period" => {
                if let Some(period) = self.period.take() {
                    self.periods.push(Period {
                        id: period.id,
                        start_us: period.start_us,
                        duration_us: period.duration_us,
                        adaptation_sets: period.sets,
                    });
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn text(&mut self, text: &str) {
        if let Some(buf) = self.base_url_text.as_mut() {
            buf.push_str(text);
        }
    }

    fn open_mpd(&mut self, attrs: &Attributes) -> Result<(), ParseError> {
        if let Some(kind) = attrs.get("type") {
            if kind != "static" {
                return Err(ParseError::UnsupportedPresentationType(kind.to_string()));
            }
        }

        self.duration_us = attrs
            .duration_us("mediaPresentationDuration")?
            .ok_or(ParseError::MissingAttribute {
                element: "MPD",
                attribute: "mediaPresentationDuration",
            })?;
        if self.duration_us == 0 {
            return Err(ParseError::InvalidValue {
                attribute: "mediaPresentationDuration",
                value: attrs.get("mediaPresentationDuration").unwrap_or_default().to_string(),
            });
        }
        self.min_buffer_time_us = attrs.duration_us("minBufferTime")?.unwrap_or(0);
        self.seen_mpd = true;
        Ok(())
    }

    fn open_period(&mut self, attrs: &Attributes) -> Result<(), ParseError> {
        if !self.seen_mpd {
            return Err(ParseError::Malformed("<Period> outside of <MPD>".to_string()));
        }
        self.period = Some(PeriodState {
            id: attrs.get("id").map(str::to_string),
            start_us: attrs.duration_us("start")?.unwrap_or(0),
            duration_us: attrs.duration_us("duration")?,
            base_url: self.base_url.clone(),
            addressing: Addressing::default(),
            sets: Vec::new(),
        });
        Ok(())
    }

    fn open_set(&mut self, attrs: &Attributes) -> Result<(), ParseError> {
        let Some(period) = self.period.as_ref() else {
            return Err(ParseError::Malformed(
                "<AdaptationSet> outside of <Period>".to_string(),
            ));
        };
        self.set = Some(SetState {
            group: attrs.parse("group")?,
            mime_type: attrs.get("mimeType").map(str::to_string),
            codecs: attrs.get("codecs").map(str::to_string),
            width: attrs.parse("width")?,
            height: attrs.parse("height")?,
            sar: attrs.ratio("sar")?,
            max_width: attrs.parse("maxWidth")?,
            max_height: attrs.parse("maxHeight")?,
            par: attrs.ratio("par")?,
            base_url: period.base_url.clone(),
            addressing: Addressing::default(),
            reps: Vec::new(),
        });
        Ok(())
    }

    fn open_rep(&mut self, attrs: &Attributes) -> Result<(), ParseError> {
        let Some(set) = self.set.as_ref() else {
            return Err(ParseError::Malformed(
                "<Representation> outside of <AdaptationSet>".to_string(),
            ));
        };
        self.rep = Some(RepState {
            id: attrs.require("id")?.to_string(),
            bandwidth: attrs.require_parsed("bandwidth")?,
            mime_type: attrs
                .get("mimeType")
                .map(str::to_string)
                .or_else(|| set.mime_type.clone()),
            codecs: attrs
                .get("codecs")
                .map(str::to_string)
                .or_else(|| set.codecs.clone()),
            width: attrs.parse("width")?.or(set.width),
            height: attrs.parse("height")?.or(set.height),
            sar: attrs.ratio("sar")?.or(set.sar),
            base_url: set.base_url.clone(),
            addressing: Addressing::default(),
        });
        Ok(())
    }

    fn close_set(&mut self) -> Result<(), ParseError> {
        let (Some(set), Some(period)) = (self.set.take(), self.period.as_mut()) else {
            return Ok(());
        };

        let span_us = period
            .duration_us
            .unwrap_or_else(|| self.duration_us.saturating_sub(period.start_us));
        let mut representations = Vec::with_capacity(set.reps.len());
        for rep in set.reps {
            let representation =
                derive_representation(rep, &set.addressing, &period.addressing, span_us)?;
            trace!(
                id = %representation.id,
                bandwidth = representation.bandwidth,
                segments = representation.segments.len(),
                "Derived representation"
            );
            representations.push(Arc::new(representation));
        }

        let key = self.next_set_key;
        self.next_set_key += 1;
        period.sets.push(Arc::new(AdaptationSet {
            key,
            group: set.group,
            mime_type: set.mime_type,
            max_width: set.max_width,
            max_height: set.max_height,
            par: set.par,
            representations,
        }));
        Ok(())
    }

    fn innermost_base_url(&mut self) -> &mut Url {
        if let Some(rep) = self.rep.as_mut() {
            &mut rep.base_url
        } else if let Some(set) = self.set.as_mut() {
            &mut set.base_url
        } else if let Some(period) = self.period.as_mut() {
            &mut period.base_url
        } else {
            &mut self.base_url
        }
    }

    fn innermost_addressing(&mut self) -> Option<&mut Addressing> {
        if let Some(rep) = self.rep.as_mut() {
            Some(&mut rep.addressing)
        } else if let Some(set) = self.set.as_mut() {
            Some(&mut set.addressing)
        } else {
            self.period.as_mut().map(|period| &mut period.addressing)
        }
    }

    fn finish(self) -> Result<Presentation, ParseError> {
        if !self.seen_mpd {
            return Err(ParseError::MissingElement("MPD"));
        }
        if self.periods.is_empty() {
            return Err(ParseError::MissingElement("Period"));
        }

        debug!(
            duration_us = self.duration_us,
            min_buffer_time_us = self.min_buffer_time_us,
            periods = self.periods.len(),
            "Parsed MPD"
        );

        Ok(Presentation {
            duration_us: self.duration_us,
            min_buffer_time_us: self.min_buffer_time_us,
            base_url: self.base_url,
            periods: self.periods,
        })
    }
}

/// Turns a collected `<Representation>` into its concrete segment list.
/// Addressing precedence: SegmentList, then SegmentTemplate, then SegmentBase, each looked up
/// from the innermost scope outwards.
fn derive_representation(
    rep: RepState,
    set: &Addressing,
    period: &Addressing,
    span_us: u64,
) -> Result<Representation, ParseError> {
    let list = rep
        .addressing
        .list
        .as_ref()
        .or(set.list.as_ref())
        .or(period.list.as_ref());
    let template = match (
        rep.addressing.template.clone(),
        set.template.as_ref(),
        period.template.as_ref(),
    ) {
        (None, None, None) => None,
        (own, set_level, period_level) => {
            let empty = TemplateAttrs::default();
            Some(
                own.unwrap_or_default()
                    .inherit(set_level.unwrap_or(&empty))
                    .inherit(period_level.unwrap_or(&empty)),
            )
        }
    };
    let base = rep
        .addressing
        .base
        .as_ref()
        .or(set.base.as_ref())
        .or(period.base.as_ref());

    let (segment_duration_us, init_segment, segments) = if let Some(list) = list {
        expand_list(&rep, list, span_us)?
    } else if let Some(template) = template {
        expand_template(&rep, &template, span_us)?
    } else if let Some(base) = base {
        let init = base
            .initialization
            .as_ref()
            .ok_or(ParseError::MissingElement("Initialization"))?;
        let init_segment = Segment::new(join(&rep.base_url, init.url.as_deref())?, init.range);
        let media = Segment::new(rep.base_url.clone(), None);
        (span_us, init_segment, vec![media])
    } else {
        return Err(ParseError::MissingElement("SegmentTemplate"));
    };

    if segments.is_empty() {
        return Err(ParseError::MissingElement("Segment"));
    }

    Ok(Representation {
        id: rep.id,
        codecs: rep.codecs,
        mime_type: rep.mime_type,
        width: rep.width,
        height: rep.height,
        sar: rep.sar,
        bandwidth: rep.bandwidth,
        segment_duration_us,
        init_segment,
        segments,
    })
}

fn expand_list(
    rep: &RepState,
    list: &SegmentListAttrs,
    span_us: u64,
) -> Result<(u64, Segment, Vec<Segment>), ParseError> {
    let init = list
        .initialization
        .as_ref()
        .ok_or(ParseError::MissingElement("Initialization"))?;
    let init_segment = Segment::new(join(&rep.base_url, init.url.as_deref())?, init.range);

    let segments = list
        .urls
        .iter()
        .map(|url| -> Result<Segment, ParseError> {
            Ok(Segment::new(join(&rep.base_url, url.url.as_deref())?, url.range))
        })
        .collect::<Result<Vec<_>, _>>()?;

    let segment_duration_us = match list.duration {
        Some(duration) => scale_to_us(duration, list.timescale.unwrap_or(1)),
        None => span_us / segments.len().max(1) as u64,
    };
    Ok((segment_duration_us, init_segment, segments))
}

fn expand_template(
    rep: &RepState,
    template: &TemplateAttrs,
    span_us: u64,
) -> Result<(u64, Segment, Vec<Segment>), ParseError> {
    let vars = TemplateVars::new(&rep.id, rep.bandwidth);

    let initialization = template
        .initialization
        .as_deref()
        .ok_or(ParseError::MissingAttribute {
            element: "SegmentTemplate",
            attribute: "initialization",
        })?;
    let init_segment = Segment::new(rep.base_url.join(&resolve(initialization, &vars))?, None);

    let media = template.media.as_deref().ok_or(ParseError::MissingAttribute {
        element: "SegmentTemplate",
        attribute: "media",
    })?;

    let timescale = template.timescale.unwrap_or(1);
    let start_number = template.start_number.unwrap_or(1);
    let offset = template.presentation_time_offset.unwrap_or(0);

    // (number, time) for every segment
    let (duration, slots): (u64, Vec<(u64, u64)>) = match &template.timeline {
        Some(timeline) => {
            let boundary = offset + scale_from_us(span_us, timescale);
            let (duration, times) = expand_timeline(timeline, boundary)?;
            let slots = times
                .into_iter()
                .zip(start_number..)
                .map(|(time, number)| (number, time))
                .collect();
            (duration, slots)
        }
        None => {
            let duration = template.duration.ok_or(ParseError::MissingAttribute {
                element: "SegmentTemplate",
                attribute: "duration",
            })?;
            let segment_duration_us = scale_to_us(duration, timescale);
            if segment_duration_us == 0 {
                return Err(ParseError::InvalidValue {
                    attribute: "duration",
                    value: duration.to_string(),
                });
            }
            let count = span_us.div_ceil(segment_duration_us);
            let slots = (0..count)
                .map(|i| (start_number + i, offset + i * duration))
                .collect();
            (duration, slots)
        }
    };

    let segments = slots
        .into_iter()
        .map(|(number, time)| -> Result<Segment, ParseError> {
            let path = resolve(media, &vars.with_number(number).with_time(time));
            Ok(Segment::new(rep.base_url.join(&path)?, None))
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok((scale_to_us(duration, timescale), init_segment, segments))
}

/// Expands the single `<S>` entry of a timeline into segment start times. `boundary`
/// (timescale units) closes a negative repeat.
fn expand_timeline(
    entries: &[TimelineEntry],
    boundary: u64,
) -> Result<(u64, Vec<u64>), ParseError> {
    let entry = match entries {
        [entry] => entry,
        [] => {
            return Err(ParseError::UnsupportedTimeline(
                "SegmentTimeline without S entries".to_string(),
            ))
        }
        _ => {
            return Err(ParseError::UnsupportedTimeline(format!(
                "{} S entries, only one is supported",
                entries.len()
            )))
        }
    };
    if entry.d == 0 {
        return Err(ParseError::InvalidValue {
            attribute: "d",
            value: "0".to_string(),
        });
    }

    let duration = entry.d;
    let start = entry.t.unwrap_or(0);
    let repeat = if entry.r >= 0 {
        entry.r
    } else {
        ((boundary as i64 - start as i64).div_euclid(duration as i64) - 1).max(-1)
    };
    let times = (0..=repeat).map(|k| start + k as u64 * duration).collect();
    Ok((duration, times))
}

fn join(base: &Url, reference: Option<&str>) -> Result<Url, ParseError> {
    match reference {
        Some(reference) if !reference.is_empty() => Ok(base.join(reference)?),
        _ => Ok(base.clone()),
    }
}

/// Attributes of one element keyed by local name.
struct Attributes {
    element: &'static str,
    values: HashMap<String, String>,
}

impl Attributes {
    fn collect(element: &'static str, e: &BytesStart<'_>) -> Result<Self, ParseError> {
        let mut values = HashMap::new();
        for attr in e.attributes() {
            let attr = attr?;
            let key = String::from_utf8_lossy(attr.key.local_name().as_ref()).into_owned();
            values.insert(key, attr.unescape_value()?.into_owned());
        }
        Ok(Self { element, values })
    }

    fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    fn require(&self, name: &'static str) -> Result<&str, ParseError> {
        self.get(name).ok_or(ParseError::MissingAttribute {
            element: self.element,
            attribute: name,
        })
    }

    fn parse<T: FromStr>(&self, name: &'static str) -> Result<Option<T>, ParseError> {
        self.get(name)
            .map(|value| {
                value.trim().parse::<T>().map_err(|_| ParseError::InvalidValue {
                    attribute: name,
                    value: value.to_string(),
                })
            })
            .transpose()
    }

    fn require_parsed<T: FromStr>(&self, name: &'static str) -> Result<T, ParseError> {
        self.parse(name)?.ok_or(ParseError::MissingAttribute {
            element: self.element,
            attribute: name,
        })
    }

    fn duration_us(&self, name: &str) -> Result<Option<u64>, ParseError> {
        self.get(name).map(parse_xs_duration_us).transpose()
    }

    fn ratio(&self, name: &'static str) -> Result<Option<f64>, ParseError> {
        self.get(name).map(|value| parse_ratio(name, value)).transpose()
    }

    fn range(&self, name: &str) -> Result<Option<ByteRange>, ParseError> {
        self.get(name).map(ByteRange::parse).transpose()
    }
}
