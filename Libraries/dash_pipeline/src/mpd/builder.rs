use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use std::io::Cursor;

/// One representation within the adaptation set
#[derive(Debug, Clone)]
pub struct RepresentationDef {
    pub id: String,
    pub codecs: String,
    pub bandwidth: u64,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub initialization: String,
    pub media: String,
}

/// Static (on-demand) MPD builder
#[derive(Debug, Clone)]
pub struct MpdBuilder {
    pub media_presentation_duration_us: u64,
    pub min_buffer_time_us: u64,
    pub base_url: Option<String>,
    pub mime_type: String,
    pub segment_duration: u64,
    pub timescale: u64,
    pub use_timeline: bool,
    pub representations: Vec<RepresentationDef>,
}

impl MpdBuilder {
    pub fn on_demand(media_presentation_duration_us: u64) -> Self {
        Self {
            media_presentation_duration_us,
            min_buffer_time_us: 2_000_000,
            base_url: None,
            mime_type: "video/mp4".to_string(),
            segment_duration: 2,
            timescale: 1,
            use_timeline: false,
            representations: vec![],
        }
    }

    /**
     * Set the minimum buffer time advertised by the MPD, in microseconds.
     */
    pub fn min_buffer_time(mut self, us: u64) -> Self {
        self.min_buffer_time_us = us;
        self
    }

    /**
     * Set a BaseURL at MPD scope. Segment URLs are resolved against it.
     */
    pub fn base_url(mut self, url: &str) -> Self {
        self.base_url = Some(url.to_string());
        self
    }

    pub fn mime_type(mut self, mime_type: &str) -> Self {
        self.mime_type = mime_type.to_string();
        self
    }

    /**
     * Set the segment duration and timescale.
     * The duration is expressed in timescale units per segment.
     */
    pub fn segment_duration(mut self, duration: u64, timescale: u64) -> Self {
        self.segment_duration = duration;
        self.timescale = timescale;
        self
    }

    /**
     * Address segments with a single-entry SegmentTimeline (`r="-1"`) instead of
     * `SegmentTemplate@duration`.
     */
    pub fn with_timeline(mut self) -> Self {
        self.use_timeline = true;
        self
    }

    /**
     * Add a representation. Representations should be added in ascending bandwidth order.
     * `initialization` and `media` are SegmentTemplate strings, e.g. "$RepresentationID$/$Number$.m4s".
     */
    pub fn add_representation(
        mut self,
        id: &str,
        codecs: &str,
        bandwidth: u64,
        resolution: Option<(u32, u32)>,
        initialization: &str,
        media: &str,
    ) -> Self {
        self.representations.push(RepresentationDef {
            id: id.to_string(),
            codecs: codecs.to_string(),
            bandwidth,
            width: resolution.map(|(w, _)| w),
            height: resolution.map(|(_, h)| h),
            initialization: initialization.to_string(),
            media: media.to_string(),
        });
        self
    }

    /**
     * Build the MPD XML string.
     */
    pub fn build_xml_string(&self) -> Result<String, Box<dyn std::error::Error + Send + Sync>> {
        let mut writer = Writer::new(Cursor::new(Vec::new()));

        let mut mpd = BytesStart::new("MPD");
        mpd.push_attribute(("xmlns", "urn:mpeg:dash:schema:mpd:2011"));
        mpd.push_attribute(("type", "static"));
        mpd.push_attribute((
            "mediaPresentationDuration",
            format_xs_duration(self.media_presentation_duration_us).as_str(),
        ));
        mpd.push_attribute((
            "minBufferTime",
            format_xs_duration(self.min_buffer_time_us).as_str(),
        ));
        writer.write_event(Event::Start(mpd))?;

        if let Some(base_url) = &self.base_url {
            writer.write_event(Event::Start(BytesStart::new("BaseURL")))?;
            writer.write_event(Event::Text(BytesText::new(base_url)))?;
            writer.write_event(Event::End(BytesEnd::new("BaseURL")))?;
        }

        writer.write_event(Event::Start(BytesStart::new("Period")))?;

        let mut adaptation = BytesStart::new("AdaptationSet");
        adaptation.push_attribute(("mimeType", self.mime_type.as_str()));
        writer.write_event(Event::Start(adaptation))?;

        for rep in &self.representations {
            let mut rep_el = BytesStart::new("Representation");
            rep_el.push_attribute(("id", rep.id.as_str()));
            rep_el.push_attribute(("bandwidth", rep.bandwidth.to_string().as_str()));
            rep_el.push_attribute(("codecs", rep.codecs.as_str()));
            if let (Some(width), Some(height)) = (rep.width, rep.height) {
                rep_el.push_attribute(("width", width.to_string().as_str()));
                rep_el.push_attribute(("height", height.to_string().as_str()));
            }
            writer.write_event(Event::Start(rep_el))?;

            let mut template = BytesStart::new("SegmentTemplate");
            template.push_attribute(("timescale", self.timescale.to_string().as_str()));
            template.push_attribute(("startNumber", "1"));
            if !self.use_timeline {
                template.push_attribute(("duration", self.segment_duration.to_string().as_str()));
            }
            template.push_attribute(("initialization", rep.initialization.as_str()));
            template.push_attribute(("media", rep.media.as_str()));

            if self.use_timeline {
                writer.write_event(Event::Start(template))?;
                writer.write_event(Event::Start(BytesStart::new("SegmentTimeline")))?;
                let mut entry = BytesStart::new("S");
                entry.push_attribute(("t", "0"));
                entry.push_attribute(("d", self.segment_duration.to_string().as_str()));
                entry.push_attribute(("r", "-1"));
                writer.write_event(Event::Empty(entry))?;
                writer.write_event(Event::End(BytesEnd::new("SegmentTimeline")))?;
                writer.write_event(Event::End(BytesEnd::new("SegmentTemplate")))?;
            } else {
                writer.write_event(Event::Empty(template))?;
            }

            writer.write_event(Event::End(BytesEnd::new("Representation")))?;
        }

        writer.write_event(Event::End(BytesEnd::new("AdaptationSet")))?;
        writer.write_event(Event::End(BytesEnd::new("Period")))?;
        writer.write_event(Event::End(BytesEnd::new("MPD")))?;

        let result = writer.into_inner().into_inner();
        Ok(String::from_utf8(result)?)
    }
}

/// `xs:duration` with second granularity and up to microsecond fractions.
pub fn format_xs_duration(us: u64) -> String {
    let (secs, frac) = (us / 1_000_000, us % 1_000_000);
    if frac == 0 {
        format!("PT{secs}S")
    } else {
        let frac = format!("{frac:06}");
        format!("PT{secs}.{}S", frac.trim_end_matches('0'))
    }
}
